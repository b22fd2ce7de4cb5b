use std::collections::HashMap;

use sqlx::postgres::PgRow;
use sqlx::PgPool;
use sqlx::Row;
use uuid::Uuid;

use super::PgTransaction;
use crate::domain::ItemNota;
use crate::domain::NotaFiscal;
use crate::domain::StatusNota;

fn nota_from_row(row: &PgRow) -> Result<NotaFiscal, sqlx::Error> {
    let status: String = row.try_get("status")?;
    Ok(NotaFiscal {
        id: row.try_get("id")?,
        numero: row.try_get("numero")?,
        // a status string we did not write is data corruption, not a variant
        status: StatusNota::parse(&status).map_err(|e| sqlx::Error::Decode(e.into()))?,
        data_criacao: row.try_get("data_criacao")?,
        data_fechada: row.try_get("data_fechada")?,
        itens: Vec::new(),
    })
}

fn item_from_row(row: &PgRow) -> Result<ItemNota, sqlx::Error> {
    Ok(ItemNota {
        id: row.try_get("id")?,
        nota_id: row.try_get("nota_id")?,
        produto_id: row.try_get("produto_id")?,
        quantidade: row.try_get("quantidade")?,
        preco_unitario: row.try_get("preco_unitario")?,
    })
}

pub async fn inserir(pool: &PgPool, nota: &NotaFiscal) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO notas_fiscais
            (id, numero, status, data_criacao, data_fechada)
        VALUES ($1, $2, $3, $4, $5)
        "#,
    )
    .bind(nota.id)
    .bind(&nota.numero)
    .bind(nota.status.as_str())
    .bind(nota.data_criacao)
    .bind(nota.data_fechada)
    .execute(pool)
    .await?;
    Ok(())
}

#[tracing::instrument(skip(pool))]
pub async fn buscar(
    pool: &PgPool,
    id: Uuid,
    com_itens: bool,
) -> Result<Option<NotaFiscal>, sqlx::Error> {
    let row = sqlx::query(
        r#"
        SELECT id, numero, status, data_criacao, data_fechada
        FROM notas_fiscais
        WHERE id = $1
        "#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;

    let Some(row) = row else { return Ok(None) };
    let mut nota = nota_from_row(&row)?;
    if com_itens {
        nota.itens = itens_da_nota(pool, id).await?;
    }
    Ok(Some(nota))
}

/// List notas (items eager-loaded), optionally filtered by status.
pub async fn listar(
    pool: &PgPool,
    status: Option<StatusNota>,
) -> Result<Vec<NotaFiscal>, sqlx::Error> {
    let rows = match status {
        Some(status) => {
            sqlx::query(
                r#"
                SELECT id, numero, status, data_criacao, data_fechada
                FROM notas_fiscais
                WHERE status = $1
                ORDER BY data_criacao
                "#,
            )
            .bind(status.as_str())
            .fetch_all(pool)
            .await?
        }
        None => {
            sqlx::query(
                r#"
                SELECT id, numero, status, data_criacao, data_fechada
                FROM notas_fiscais
                ORDER BY data_criacao
                "#,
            )
            .fetch_all(pool)
            .await?
        }
    };

    let mut notas = rows
        .iter()
        .map(nota_from_row)
        .collect::<Result<Vec<_>, _>>()?;
    if notas.is_empty() {
        return Ok(notas);
    }

    let ids: Vec<Uuid> = notas.iter().map(|n| n.id).collect();
    let item_rows = sqlx::query(
        r#"
        SELECT id, nota_id, produto_id, quantidade, preco_unitario
        FROM itens_nota
        WHERE nota_id = ANY($1)
        ORDER BY id
        "#,
    )
    .bind(ids)
    .fetch_all(pool)
    .await?;

    let mut por_nota: HashMap<Uuid, Vec<ItemNota>> = HashMap::new();
    for row in &item_rows {
        let item = item_from_row(row)?;
        por_nota.entry(item.nota_id).or_default().push(item);
    }
    for nota in &mut notas {
        if let Some(itens) = por_nota.remove(&nota.id) {
            nota.itens = itens;
        }
    }
    Ok(notas)
}

/// Load a nota with a row-level exclusive lock, items eager-loaded. The lock
/// is held until the enclosing transaction commits or rolls back, and
/// serializes concurrent Saga replies against the same nota.
pub async fn buscar_para_atualizacao(
    tx: &mut PgTransaction,
    id: Uuid,
) -> Result<Option<NotaFiscal>, sqlx::Error> {
    let row = sqlx::query(
        r#"
        SELECT id, numero, status, data_criacao, data_fechada
        FROM notas_fiscais
        WHERE id = $1
        FOR UPDATE
        "#,
    )
    .bind(id)
    .fetch_optional(&mut **tx)
    .await?;

    let Some(row) = row else { return Ok(None) };
    let mut nota = nota_from_row(&row)?;

    let item_rows = sqlx::query(
        r#"
        SELECT id, nota_id, produto_id, quantidade, preco_unitario
        FROM itens_nota
        WHERE nota_id = $1
        ORDER BY id
        "#,
    )
    .bind(id)
    .fetch_all(&mut **tx)
    .await?;
    nota.itens = item_rows
        .iter()
        .map(item_from_row)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Some(nota))
}

/// Persist the mutable attributes of a nota (status and close timestamp).
pub async fn salvar(tx: &mut PgTransaction, nota: &NotaFiscal) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE notas_fiscais
        SET status = $2, data_fechada = $3
        WHERE id = $1
        "#,
    )
    .bind(nota.id)
    .bind(nota.status.as_str())
    .bind(nota.data_fechada)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

pub async fn inserir_item(pool: &PgPool, item: &ItemNota) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO itens_nota
            (id, nota_id, produto_id, quantidade, preco_unitario)
        VALUES ($1, $2, $3, $4, $5)
        "#,
    )
    .bind(item.id)
    .bind(item.nota_id)
    .bind(item.produto_id)
    .bind(item.quantidade)
    .bind(item.preco_unitario)
    .execute(pool)
    .await?;
    Ok(())
}

async fn itens_da_nota(pool: &PgPool, nota_id: Uuid) -> Result<Vec<ItemNota>, sqlx::Error> {
    let rows = sqlx::query(
        r#"
        SELECT id, nota_id, produto_id, quantidade, preco_unitario
        FROM itens_nota
        WHERE nota_id = $1
        ORDER BY id
        "#,
    )
    .bind(nota_id)
    .fetch_all(pool)
    .await?;
    rows.iter().map(item_from_row).collect()
}

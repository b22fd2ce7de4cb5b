use chrono::DateTime;
use chrono::Utc;
use sqlx::postgres::PgRow;
use sqlx::PgPool;
use sqlx::Row;
use uuid::Uuid;

use super::PgTransaction;
use crate::domain::EventoOutbox;

fn evento_from_row(row: &PgRow) -> Result<EventoOutbox, sqlx::Error> {
    Ok(EventoOutbox {
        id: row.try_get("id")?,
        tipo_evento: row.try_get("tipo_evento")?,
        id_agregado: row.try_get("id_agregado")?,
        payload: row.try_get("payload")?,
        data_ocorrencia: row.try_get("data_ocorrencia")?,
        data_publicacao: row.try_get("data_publicacao")?,
    })
}

/// Append an event to the outbox. Must run inside the same transaction as
/// the business write it describes; that co-write is the whole point of the
/// pattern.
pub async fn inserir(
    tx: &mut PgTransaction,
    tipo_evento: &str,
    id_agregado: Uuid,
    payload: &serde_json::Value,
    agora: DateTime<Utc>,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO eventos_outbox
            (tipo_evento, id_agregado, payload, data_ocorrencia)
        VALUES ($1, $2, $3, $4)
        "#,
    )
    .bind(tipo_evento)
    .bind(id_agregado)
    .bind(payload)
    .bind(agora)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

/// Unpublished rows, oldest first. Ascending id is what preserves per-nota
/// emission order.
pub async fn listar_nao_publicados(
    pool: &PgPool,
    limite: i64,
) -> Result<Vec<EventoOutbox>, sqlx::Error> {
    let rows = sqlx::query(
        r#"
        SELECT id, tipo_evento, id_agregado, payload, data_ocorrencia, data_publicacao
        FROM eventos_outbox
        WHERE data_publicacao IS NULL
        ORDER BY id ASC
        LIMIT $1
        "#,
    )
    .bind(limite)
    .fetch_all(pool)
    .await?;
    rows.iter().map(evento_from_row).collect()
}

pub async fn marcar_publicado(
    pool: &PgPool,
    id: i64,
    agora: DateTime<Utc>,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE eventos_outbox
        SET data_publicacao = $2
        WHERE id = $1
        "#,
    )
    .bind(id)
    .bind(agora)
    .execute(pool)
    .await?;
    Ok(())
}

use chrono::DateTime;
use chrono::Utc;
use sqlx::postgres::PgRow;
use sqlx::PgPool;
use sqlx::Row;
use uuid::Uuid;

use super::PgTransaction;
use crate::domain::SolicitacaoImpressao;
use crate::domain::StatusSolicitacao;

/// Outcome of the admission insert. `JaExistia` means another request with
/// the same idempotency key won the race between the handler's lookup and
/// this insert; the caller must treat the request as already admitted.
pub enum Insercao {
    Criada,
    JaExistia,
}

fn solicitacao_from_row(row: &PgRow) -> Result<SolicitacaoImpressao, sqlx::Error> {
    let status: String = row.try_get("status")?;
    Ok(SolicitacaoImpressao {
        id: row.try_get("id")?,
        nota_id: row.try_get("nota_id")?,
        status: StatusSolicitacao::parse(&status).map_err(|e| sqlx::Error::Decode(e.into()))?,
        mensagem_erro: row.try_get("mensagem_erro")?,
        chave_idempotencia: row.try_get("chave_idempotencia")?,
        data_criacao: row.try_get("data_criacao")?,
        data_conclusao: row.try_get("data_conclusao")?,
    })
}

/// Insert a PENDENTE request, tolerating an idempotency-key collision.
pub async fn inserir_pendente(
    tx: &mut PgTransaction,
    solicitacao: &SolicitacaoImpressao,
) -> Result<Insercao, sqlx::Error> {
    let result = sqlx::query(
        r#"
        INSERT INTO solicitacoes_impressao
            (id, nota_id, status, mensagem_erro, chave_idempotencia, data_criacao, data_conclusao)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        ON CONFLICT (chave_idempotencia) DO NOTHING
        "#,
    )
    .bind(solicitacao.id)
    .bind(solicitacao.nota_id)
    .bind(solicitacao.status.as_str())
    .bind(&solicitacao.mensagem_erro)
    .bind(&solicitacao.chave_idempotencia)
    .bind(solicitacao.data_criacao)
    .bind(solicitacao.data_conclusao)
    .execute(&mut **tx)
    .await?;

    match result.rows_affected() > 0 {
        true => Ok(Insercao::Criada),
        false => Ok(Insercao::JaExistia),
    }
}

pub async fn buscar_por_chave(
    pool: &PgPool,
    chave: &str,
) -> Result<Option<SolicitacaoImpressao>, sqlx::Error> {
    let row = sqlx::query(
        r#"
        SELECT id, nota_id, status, mensagem_erro, chave_idempotencia, data_criacao, data_conclusao
        FROM solicitacoes_impressao
        WHERE chave_idempotencia = $1
        "#,
    )
    .bind(chave)
    .fetch_optional(pool)
    .await?;
    row.as_ref().map(solicitacao_from_row).transpose()
}

pub async fn buscar(
    pool: &PgPool,
    id: Uuid,
) -> Result<Option<SolicitacaoImpressao>, sqlx::Error> {
    let row = sqlx::query(
        r#"
        SELECT id, nota_id, status, mensagem_erro, chave_idempotencia, data_criacao, data_conclusao
        FROM solicitacoes_impressao
        WHERE id = $1
        "#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;
    row.as_ref().map(solicitacao_from_row).transpose()
}

/// Move every PENDENTE request of the nota to CONCLUIDA. The WHERE clause is
/// what enforces the terminal-state invariant: rows that already left
/// PENDENTE are untouched.
pub async fn concluir_pendentes(
    tx: &mut PgTransaction,
    nota_id: Uuid,
    agora: DateTime<Utc>,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE solicitacoes_impressao
        SET status = 'CONCLUIDA', data_conclusao = $2
        WHERE nota_id = $1 AND status = 'PENDENTE'
        "#,
    )
    .bind(nota_id)
    .bind(agora)
    .execute(&mut **tx)
    .await?;
    Ok(result.rows_affected())
}

/// Move every PENDENTE request of the nota to FALHOU with the given reason.
pub async fn falhar_pendentes(
    tx: &mut PgTransaction,
    nota_id: Uuid,
    motivo: &str,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE solicitacoes_impressao
        SET status = 'FALHOU', mensagem_erro = $2
        WHERE nota_id = $1 AND status = 'PENDENTE'
        "#,
    )
    .bind(nota_id)
    .bind(motivo)
    .execute(&mut **tx)
    .await?;
    Ok(result.rows_affected())
}

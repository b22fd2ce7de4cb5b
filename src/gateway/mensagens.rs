use chrono::DateTime;
use chrono::Utc;

use super::PgTransaction;

/// Consumer-side dedup check. Runs inside the per-message transaction so the
/// check and the effects it guards commit or roll back together.
pub async fn ja_processada(tx: &mut PgTransaction, id_mensagem: &str) -> Result<bool, sqlx::Error> {
    sqlx::query_scalar(
        r#"
        SELECT EXISTS (
            SELECT 1 FROM mensagens_processadas WHERE id_mensagem = $1
        )
        "#,
    )
    .bind(id_mensagem)
    .fetch_one(&mut **tx)
    .await
}

/// Record a message as processed; the final write of every successful
/// message transaction. A concurrent consumer racing the same message id
/// aborts here on the primary key and redelivers into the dedup check.
pub async fn registrar(
    tx: &mut PgTransaction,
    id_mensagem: &str,
    agora: DateTime<Utc>,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO mensagens_processadas (id_mensagem, data_processada)
        VALUES ($1, $2)
        "#,
    )
    .bind(id_mensagem)
    .bind(agora)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

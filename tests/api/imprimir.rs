use serde_json::Value;
use sqlx::Row;
use uuid::Uuid;

use crate::helpers::spawn_app;
use crate::helpers::TestApp;

async fn contar_solicitacoes(app: &TestApp) -> i64 {
    sqlx::query_scalar("SELECT COUNT(*) FROM solicitacoes_impressao")
        .fetch_one(&app.pool)
        .await
        .unwrap()
}

async fn contar_eventos_outbox(app: &TestApp) -> i64 {
    sqlx::query_scalar("SELECT COUNT(*) FROM eventos_outbox")
        .fetch_one(&app.pool)
        .await
        .unwrap()
}

#[tokio::test]
#[ignore = "requer um Postgres local (docker compose up postgres)"]
async fn imprimir_cria_solicitacao_pendente_e_evento_no_outbox() {
    let app = spawn_app().await;
    let nota_id = app.nota_pronta_para_imprimir("NF-001").await;

    let resp = app.imprimir(&nota_id.to_string(), Some("chave-1")).await;

    assert_eq!(resp.status().as_u16(), 201);
    let solicitacao: Value = resp.json().await.unwrap();
    assert_eq!(solicitacao["status"], "PENDENTE");
    assert_eq!(solicitacao["notaId"], serde_json::json!(nota_id));
    assert_eq!(solicitacao["chaveIdempotencia"], "chave-1");

    // the co-written outbox row, still unpublished
    let row = sqlx::query(
        "SELECT tipo_evento, id_agregado, payload, data_publicacao FROM eventos_outbox",
    )
    .fetch_one(&app.pool)
    .await
    .unwrap();
    assert_eq!(
        row.get::<String, _>("tipo_evento"),
        "Faturamento.ImpressaoSolicitada"
    );
    assert_eq!(row.get::<Uuid, _>("id_agregado"), nota_id);
    assert!(row
        .get::<Option<chrono::DateTime<chrono::Utc>>, _>("data_publicacao")
        .is_none());

    let payload = row.get::<Value, _>("payload");
    assert_eq!(payload["notaId"], serde_json::json!(nota_id));
    let itens = payload["itens"].as_array().unwrap();
    assert_eq!(itens.len(), 1);
    assert_eq!(itens[0]["quantidade"], 3);
}

#[tokio::test]
#[ignore = "requer um Postgres local (docker compose up postgres)"]
async fn imprimir_com_a_mesma_chave_devolve_a_mesma_solicitacao() {
    let app = spawn_app().await;
    let nota_id = app.nota_pronta_para_imprimir("NF-001").await;

    let primeira = app.imprimir(&nota_id.to_string(), Some("chave-2")).await;
    assert_eq!(primeira.status().as_u16(), 201);
    let primeira: Value = primeira.json().await.unwrap();

    let segunda = app.imprimir(&nota_id.to_string(), Some("chave-2")).await;
    assert_eq!(segunda.status().as_u16(), 200);
    let segunda: Value = segunda.json().await.unwrap();

    assert_eq!(primeira["id"], segunda["id"]);
    // exactly one request row and one outbox row, despite the replay
    assert_eq!(contar_solicitacoes(&app).await, 1);
    assert_eq!(contar_eventos_outbox(&app).await, 1);
}

#[tokio::test]
#[ignore = "requer um Postgres local (docker compose up postgres)"]
async fn imprimir_sem_chave_de_idempotencia_retorna_400() {
    let app = spawn_app().await;
    let nota_id = app.nota_pronta_para_imprimir("NF-001").await;

    let resp = app.imprimir(&nota_id.to_string(), None).await;

    assert_eq!(resp.status().as_u16(), 400);
    assert_eq!(contar_solicitacoes(&app).await, 0);
}

#[tokio::test]
#[ignore = "requer um Postgres local (docker compose up postgres)"]
async fn imprimir_com_id_invalido_retorna_400() {
    let app = spawn_app().await;

    let resp = app.imprimir("nao-e-uuid", Some("chave-3")).await;

    assert_eq!(resp.status().as_u16(), 400);
}

#[tokio::test]
#[ignore = "requer um Postgres local (docker compose up postgres)"]
async fn imprimir_nota_inexistente_retorna_404() {
    let app = spawn_app().await;

    let resp = app
        .imprimir(&Uuid::new_v4().to_string(), Some("chave-4"))
        .await;

    assert_eq!(resp.status().as_u16(), 404);
}

#[tokio::test]
#[ignore = "requer um Postgres local (docker compose up postgres)"]
async fn imprimir_nota_sem_itens_retorna_409() {
    let app = spawn_app().await;
    let resp = app.criar_nota("NF-001").await;
    let nota: Value = resp.json().await.unwrap();

    let resp = app
        .imprimir(nota["id"].as_str().unwrap(), Some("chave-5"))
        .await;

    assert_eq!(resp.status().as_u16(), 409);
    assert_eq!(contar_eventos_outbox(&app).await, 0);
}

#[tokio::test]
#[ignore = "requer um Postgres local (docker compose up postgres)"]
async fn imprimir_nota_fechada_retorna_409() {
    let app = spawn_app().await;
    let nota_id = app.nota_pronta_para_imprimir("NF-001").await;
    sqlx::query("UPDATE notas_fiscais SET status = 'FECHADA', data_fechada = now() WHERE id = $1")
        .bind(nota_id)
        .execute(&app.pool)
        .await
        .unwrap();

    let resp = app.imprimir(&nota_id.to_string(), Some("chave-6")).await;

    assert_eq!(resp.status().as_u16(), 409);
}

#[tokio::test]
#[ignore = "requer um Postgres local (docker compose up postgres)"]
async fn consultar_solicitacao_inexistente_retorna_404() {
    let app = spawn_app().await;

    let resp = app.consultar_solicitacao(&Uuid::new_v4().to_string()).await;

    assert_eq!(resp.status().as_u16(), 404);
}

#[tokio::test]
#[ignore = "requer um Postgres local (docker compose up postgres)"]
async fn consultar_solicitacao_devolve_o_estado_atual() {
    let app = spawn_app().await;
    let nota_id = app.nota_pronta_para_imprimir("NF-001").await;
    let resp = app.imprimir(&nota_id.to_string(), Some("chave-7")).await;
    let criada: Value = resp.json().await.unwrap();

    let resp = app
        .consultar_solicitacao(criada["id"].as_str().unwrap())
        .await;

    assert_eq!(resp.status().as_u16(), 200);
    let consultada: Value = resp.json().await.unwrap();
    assert_eq!(consultada["id"], criada["id"]);
    assert_eq!(consultada["status"], "PENDENTE");
}

use serde_json::Value;
use sqlx::Row;
use uuid::Uuid;

use crate::helpers::spawn_app;

#[tokio::test]
#[ignore = "requer um Postgres local (docker compose up postgres)"]
async fn criar_nota_persiste_e_retorna_201() {
    let app = spawn_app().await;

    let resp = app.criar_nota("NF-001").await;

    assert_eq!(resp.status().as_u16(), 201);
    let nota: Value = resp.json().await.unwrap();
    assert_eq!(nota["numero"], "NF-001");
    assert_eq!(nota["status"], "ABERTA");

    let row = sqlx::query("SELECT numero, status FROM notas_fiscais")
        .fetch_one(&app.pool)
        .await
        .unwrap();
    assert_eq!(row.get::<String, _>("numero"), "NF-001");
    assert_eq!(row.get::<String, _>("status"), "ABERTA");
}

#[tokio::test]
#[ignore = "requer um Postgres local (docker compose up postgres)"]
async fn criar_nota_sem_numero_retorna_400() {
    let app = spawn_app().await;

    let resp = app.criar_nota("").await;

    assert_eq!(resp.status().as_u16(), 400);
}

#[tokio::test]
#[ignore = "requer um Postgres local (docker compose up postgres)"]
async fn criar_nota_com_numero_duplicado_retorna_409() {
    let app = spawn_app().await;

    assert_eq!(app.criar_nota("NF-001").await.status().as_u16(), 201);
    let resp = app.criar_nota("NF-001").await;

    assert_eq!(resp.status().as_u16(), 409);
}

#[tokio::test]
#[ignore = "requer um Postgres local (docker compose up postgres)"]
async fn buscar_nota_com_id_invalido_retorna_400() {
    let app = spawn_app().await;

    let resp = app.buscar_nota("nao-e-uuid").await;

    assert_eq!(resp.status().as_u16(), 400);
}

#[tokio::test]
#[ignore = "requer um Postgres local (docker compose up postgres)"]
async fn buscar_nota_inexistente_retorna_404() {
    let app = spawn_app().await;

    let resp = app.buscar_nota(&Uuid::new_v4().to_string()).await;

    assert_eq!(resp.status().as_u16(), 404);
}

#[tokio::test]
#[ignore = "requer um Postgres local (docker compose up postgres)"]
async fn buscar_nota_carrega_itens() {
    let app = spawn_app().await;
    let nota_id = app.nota_pronta_para_imprimir("NF-001").await;

    let resp = app.buscar_nota(&nota_id.to_string()).await;

    assert_eq!(resp.status().as_u16(), 200);
    let nota: Value = resp.json().await.unwrap();
    assert_eq!(nota["itens"].as_array().unwrap().len(), 1);
    assert_eq!(nota["itens"][0]["quantidade"], 3);
}

#[tokio::test]
#[ignore = "requer um Postgres local (docker compose up postgres)"]
async fn listar_notas_filtra_por_status() {
    let app = spawn_app().await;
    app.criar_nota("NF-001").await;
    app.criar_nota("NF-002").await;

    let resp = app
        .api_client
        .get(format!("{}/notas?status=FECHADA", app.addr))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 200);
    let notas: Vec<Value> = resp.json().await.unwrap();
    assert!(notas.is_empty());

    let resp = app
        .api_client
        .get(format!("{}/notas?status=ABERTA", app.addr))
        .send()
        .await
        .unwrap();
    let notas: Vec<Value> = resp.json().await.unwrap();
    assert_eq!(notas.len(), 2);
}

#[tokio::test]
#[ignore = "requer um Postgres local (docker compose up postgres)"]
async fn listar_notas_com_status_invalido_retorna_400() {
    let app = spawn_app().await;

    let resp = app
        .api_client
        .get(format!("{}/notas?status=CANCELADA", app.addr))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status().as_u16(), 400);
}

#[tokio::test]
#[ignore = "requer um Postgres local (docker compose up postgres)"]
async fn adicionar_item_retorna_201() {
    let app = spawn_app().await;
    let resp = app.criar_nota("NF-001").await;
    let nota: Value = resp.json().await.unwrap();
    let nota_id = nota["id"].as_str().unwrap();

    let resp = app
        .adicionar_item(
            nota_id,
            &serde_json::json!({
                "produtoId": Uuid::new_v4(),
                "quantidade": 2,
                "precoUnitario": "50.00",
            }),
        )
        .await;

    assert_eq!(resp.status().as_u16(), 201);
    let item: Value = resp.json().await.unwrap();
    assert_eq!(item["quantidade"], 2);
}

#[tokio::test]
#[ignore = "requer um Postgres local (docker compose up postgres)"]
async fn adicionar_item_com_quantidade_invalida_retorna_400() {
    let app = spawn_app().await;
    let resp = app.criar_nota("NF-001").await;
    let nota: Value = resp.json().await.unwrap();
    let nota_id = nota["id"].as_str().unwrap();

    let resp = app
        .adicionar_item(
            nota_id,
            &serde_json::json!({
                "produtoId": Uuid::new_v4(),
                "quantidade": 0,
                "precoUnitario": "50.00",
            }),
        )
        .await;

    assert_eq!(resp.status().as_u16(), 400);
}

#[tokio::test]
#[ignore = "requer um Postgres local (docker compose up postgres)"]
async fn adicionar_item_em_nota_inexistente_retorna_404() {
    let app = spawn_app().await;

    let resp = app
        .adicionar_item(
            &Uuid::new_v4().to_string(),
            &serde_json::json!({
                "produtoId": Uuid::new_v4(),
                "quantidade": 1,
                "precoUnitario": "1.00",
            }),
        )
        .await;

    assert_eq!(resp.status().as_u16(), 404);
}

#[tokio::test]
#[ignore = "requer um Postgres local (docker compose up postgres)"]
async fn adicionar_item_em_nota_fechada_retorna_409() {
    let app = spawn_app().await;
    let nota_id = app.nota_pronta_para_imprimir("NF-001").await;
    sqlx::query("UPDATE notas_fiscais SET status = 'FECHADA', data_fechada = now() WHERE id = $1")
        .bind(nota_id)
        .execute(&app.pool)
        .await
        .unwrap();

    let resp = app
        .adicionar_item(
            &nota_id.to_string(),
            &serde_json::json!({
                "produtoId": Uuid::new_v4(),
                "quantidade": 1,
                "precoUnitario": "1.00",
            }),
        )
        .await;

    assert_eq!(resp.status().as_u16(), 409);
}

use crate::helpers::spawn_app;

#[tokio::test]
#[ignore = "requer um Postgres local (docker compose up postgres)"]
async fn health_check_responde_ok() {
    let app = spawn_app().await;

    let resp = app
        .api_client
        .get(format!("{}/health", app.addr))
        .send()
        .await
        .expect("falha ao executar a requisicao");

    assert_eq!(resp.status().as_u16(), 200);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "ok");
}

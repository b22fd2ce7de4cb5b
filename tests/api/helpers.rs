use once_cell::sync::Lazy;
use serde_json::Value;
use servico_faturamento::configuration::get_configuration;
use servico_faturamento::configuration::DatabaseSettings;
use servico_faturamento::startup::Application;
use servico_faturamento::telemetry::init_telemetry;
use sqlx::Connection;
use sqlx::Executor;
use sqlx::PgConnection;
use sqlx::PgPool;
use uuid::Uuid;

/// Opt in to verbose test logs with `TEST_LOG=true cargo test -- --ignored`.
static TRACING: Lazy<()> = Lazy::new(|| match std::env::var("TEST_LOG") {
    Ok(_) => init_telemetry("teste", "debug", std::io::stdout),
    Err(_) => init_telemetry("teste", "debug", std::io::sink),
});

pub struct TestApp {
    pub addr: String,
    pub pool: PgPool,
    pub api_client: reqwest::Client,
}

/// Boot the real `Application` on a random port against a scratch database
/// created just for this test. The publisher and consumer tasks are not
/// spawned; consumer behavior is exercised by calling
/// `consumidor::processar_mensagem` directly, which is exactly what the
/// broker loop does per delivery.
pub async fn spawn_app() -> TestApp {
    Lazy::force(&TRACING);

    let mut cfg = get_configuration().expect("falha ao carregar configuracao");
    cfg.application.host = "127.0.0.1".to_string();
    cfg.application.port = 0;
    cfg.database.database_name = Some(format!("teste_{}", Uuid::new_v4().simple()));
    configure_database(&cfg.database).await;

    let app = Application::build(cfg.clone())
        .await
        .expect("falha ao subir a aplicacao");
    let addr = format!("http://127.0.0.1:{}/api/v1", app.get_port());
    tokio::spawn(app.run_until_stopped());

    let pool = servico_faturamento::startup::get_connection_pool(&cfg.database)
        .expect("falha ao criar pool de teste");

    TestApp {
        addr,
        pool,
        api_client: reqwest::Client::new(),
    }
}

async fn configure_database(db_cfg: &DatabaseSettings) {
    let mut conexao = PgConnection::connect_with(
        &db_cfg
            .connection_sem_banco()
            .expect("DATABASE_URL invalida"),
    )
    .await
    .expect("falha ao conectar ao Postgres");
    let nome = db_cfg.database_name.as_ref().unwrap();
    conexao
        .execute(format!(r#"CREATE DATABASE "{nome}";"#).as_str())
        .await
        .expect("falha ao criar banco de teste");
    // migrations run inside Application::build
}

impl TestApp {
    pub async fn criar_nota(&self, numero: &str) -> reqwest::Response {
        self.api_client
            .post(format!("{}/notas", self.addr))
            .json(&serde_json::json!({ "numero": numero }))
            .send()
            .await
            .expect("falha ao executar a requisicao")
    }

    pub async fn adicionar_item(&self, nota_id: &str, body: &Value) -> reqwest::Response {
        self.api_client
            .post(format!("{}/notas/{}/itens", self.addr, nota_id))
            .json(body)
            .send()
            .await
            .expect("falha ao executar a requisicao")
    }

    pub async fn imprimir(&self, nota_id: &str, chave: Option<&str>) -> reqwest::Response {
        let mut request = self
            .api_client
            .post(format!("{}/notas/{}/imprimir", self.addr, nota_id));
        if let Some(chave) = chave {
            request = request.header("Idempotency-Key", chave);
        }
        request.send().await.expect("falha ao executar a requisicao")
    }

    pub async fn buscar_nota(&self, nota_id: &str) -> reqwest::Response {
        self.api_client
            .get(format!("{}/notas/{}", self.addr, nota_id))
            .send()
            .await
            .expect("falha ao executar a requisicao")
    }

    pub async fn consultar_solicitacao(&self, id: &str) -> reqwest::Response {
        self.api_client
            .get(format!("{}/solicitacoes-impressao/{}", self.addr, id))
            .send()
            .await
            .expect("falha ao executar a requisicao")
    }

    /// Create a nota with one item, returning its id. The starting point of
    /// most Saga scenarios.
    pub async fn nota_pronta_para_imprimir(&self, numero: &str) -> Uuid {
        let resp = self.criar_nota(numero).await;
        assert_eq!(resp.status().as_u16(), 201);
        let nota: Value = resp.json().await.unwrap();
        let nota_id = nota["id"].as_str().unwrap().to_string();

        let resp = self
            .adicionar_item(
                &nota_id,
                &serde_json::json!({
                    "produtoId": Uuid::new_v4(),
                    "quantidade": 3,
                    "precoUnitario": "10.00",
                }),
            )
            .await;
        assert_eq!(resp.status().as_u16(), 201);
        nota_id.parse().unwrap()
    }
}

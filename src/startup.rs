use std::net::TcpListener;

use actix_cors::Cors;
use actix_web::dev::Server;
use actix_web::http::header;
use actix_web::web;
use actix_web::App;
use actix_web::HttpServer;
use anyhow::Context;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing_actix_web::TracingLogger;

use crate::configuration::DatabaseSettings;
use crate::configuration::Settings;
use crate::routes::adicionar_item;
use crate::routes::buscar_nota;
use crate::routes::consultar_solicitacao;
use crate::routes::criar_nota;
use crate::routes::health_check;
use crate::routes::imprimir_nota;
use crate::routes::listar_notas;

/// Wrapper for actix's `Server` with access to the bound port (the listener
/// may have been bound to port 0 by the test harness).
pub struct Application {
    port: u16,
    server: Server,
}

impl Application {
    pub async fn build(cfg: Settings) -> Result<Self, anyhow::Error> {
        let addr = format!("{}:{}", cfg.application.host, cfg.application.port);
        let listener = TcpListener::bind(addr)?;
        let port = listener.local_addr()?.port();

        let pool = get_connection_pool(&cfg.database)?;
        // the schema travels with the binary and is applied at boot
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .context("falha ao aplicar migrations")?;

        let server = run(listener, pool)?;
        Ok(Self { port, server })
    }

    pub fn get_port(&self) -> u16 { self.port }

    /// Consumes `self`; either await it directly or hand it to
    /// `tokio::spawn`.
    pub async fn run_until_stopped(self) -> Result<(), std::io::Error> { self.server.await }
}

/// Lazy pool: nothing connects until the first query, so the workers and the
/// server can share this without racing the database's own startup.
pub fn get_connection_pool(db_cfg: &DatabaseSettings) -> Result<PgPool, anyhow::Error> {
    let options = db_cfg.connection().context("DATABASE_URL invalida")?;
    Ok(PgPoolOptions::new().connect_lazy_with(options))
}

/// Declare the route table and middleware. The server only listens on an
/// already-bound address.
pub fn run(listener: TcpListener, pool: PgPool) -> Result<Server, anyhow::Error> {
    let pool = web::Data::new(pool);
    let server = HttpServer::new(move || {
        // the front-end and the inventory team's tooling call from anywhere
        let cors = Cors::default()
            .allow_any_origin()
            .allowed_methods(vec!["GET", "POST", "PUT", "DELETE", "OPTIONS"])
            .allowed_headers(vec![
                header::CONTENT_TYPE,
                header::HeaderName::from_static("idempotency-key"),
            ]);
        App::new()
            .wrap(TracingLogger::default())
            .wrap(cors)
            .route("/health", web::get().to(health_check))
            .service(
                web::scope("/api/v1")
                    .route("/health", web::get().to(health_check))
                    .route("/notas", web::post().to(criar_nota))
                    .route("/notas", web::get().to(listar_notas))
                    .route("/notas/{id}", web::get().to(buscar_nota))
                    .route("/notas/{id}/itens", web::post().to(adicionar_item))
                    .route("/notas/{id}/imprimir", web::post().to(imprimir_nota))
                    .route(
                        "/solicitacoes-impressao/{id}",
                        web::get().to(consultar_solicitacao),
                    ),
            )
            .app_data(pool.clone())
    })
    .listen(listener)?
    .run();
    Ok(server)
}

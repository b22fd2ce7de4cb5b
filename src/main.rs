use std::fmt::Debug;
use std::fmt::Display;

use servico_faturamento::configuration::get_configuration;
use servico_faturamento::consumidor::init_consumidor;
use servico_faturamento::publicador::init_publicador;
use servico_faturamento::startup::Application;
use servico_faturamento::telemetry::init_telemetry;
use tokio::task::JoinError;

fn report_exit(name: &str, outcome: Result<Result<(), impl Debug + Display>, JoinError>) {
    match outcome {
        Ok(Ok(())) => {
            tracing::info!("{name} encerrou normalmente")
        }
        Ok(Err(e)) => {
            tracing::error!(
                error.cause_chain = ?e,
                error.message = %e,
                "{name} falhou"
            )
        }
        Err(e) => {
            tracing::error!(
                error.cause_chain = ?e,
                error.message = %e,
                "{name} abortou"
            )
        }
    }
}

/// Boot order: telemetry, config, then the three long-lived tasks: the HTTP
/// server, the outbox publisher and the event consumer. The process lives
/// while all three live; if any of them exits, we log it and shut down, and
/// the orchestrator restarts the container. Unacked deliveries and
/// unpublished outbox rows survive the restart.
#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    init_telemetry("servico-faturamento", "info", std::io::stdout);

    let cfg = get_configuration()?;

    let server = Application::build(cfg.clone()).await?.run_until_stopped();
    let publicador = init_publicador(cfg.clone());
    let consumidor = init_consumidor(cfg);

    let server_task = tokio::spawn(server);
    let publicador_task = tokio::spawn(publicador);
    let consumidor_task = tokio::spawn(consumidor);

    tokio::select! {
        o = server_task => report_exit("servidor HTTP", o),
        o = publicador_task => report_exit("publicador outbox", o),
        o = consumidor_task => report_exit("consumidor de eventos", o),
    }

    Ok(())
}

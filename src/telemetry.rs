use tracing::subscriber::set_global_default;
use tracing_bunyan_formatter::BunyanFormattingLayer;
use tracing_bunyan_formatter::JsonStorageLayer;
use tracing_log::LogTracer;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::Registry;

/// Install the process-wide tracing stack in one shot: bunyan-formatted JSON
/// lines tagged with `nome_servico` go to `sink`, filtered by `RUST_LOG`
/// when set and by `filtro_padrao` otherwise. The `log` records emitted by
/// actix and the driver crates are bridged into the same pipeline.
///
/// Call once at boot, before the first query or request; a second call
/// panics, since the global subscriber cannot be replaced.
pub fn init_telemetry<Sink>(nome_servico: &str, filtro_padrao: &str, sink: Sink)
where
    Sink: for<'a> MakeWriter<'a> + Send + Sync + 'static,
{
    LogTracer::init().expect("falha ao instalar a ponte log -> tracing");

    let filtro =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filtro_padrao));
    let subscriber = Registry::default()
        .with(filtro)
        .with(JsonStorageLayer)
        .with(BunyanFormattingLayer::new(nome_servico.to_string(), sink));
    set_global_default(subscriber).expect("subscriber global ja registrado");
}

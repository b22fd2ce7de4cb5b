mod health_check;
mod imprimir;
mod notas;
mod solicitacoes;

pub use health_check::*;
pub use imprimir::*;
pub use notas::*;
pub use solicitacoes::*;

/// Walk the `source` chain so logs show the full cause of a failure instead
/// of only the outermost message.
pub fn error_chain_fmt(
    e: &impl std::error::Error,
    f: &mut std::fmt::Formatter<'_>,
) -> std::fmt::Result {
    writeln!(f, "{e}\n")?;
    let mut current = e.source();
    while let Some(cause) = current {
        writeln!(f, "Caused by:\n\t{cause}")?;
        current = cause.source();
    }
    Ok(())
}

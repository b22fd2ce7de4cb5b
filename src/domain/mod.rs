mod eventos;
mod nota_fiscal;
mod solicitacao;

// allow external `use` statements to skip the submodule names
pub use eventos::EstoqueReservado;
pub use eventos::EventoOutbox;
pub use eventos::ImpressaoSolicitada;
pub use eventos::ItemReserva;
pub use eventos::PayloadErro;
pub use eventos::ReservaRejeitada;
pub use eventos::EVENTO_IMPRESSAO_SOLICITADA;
pub use eventos::ROUTING_ESTOQUE_RESERVADO;
pub use eventos::ROUTING_RESERVA_REJEITADA;
pub use nota_fiscal::FecharNotaErro;
pub use nota_fiscal::ItemNota;
pub use nota_fiscal::NotaFiscal;
pub use nota_fiscal::StatusNota;
pub use solicitacao::SolicitacaoImpressao;
pub use solicitacao::StatusSolicitacao;

use chrono::DateTime;
use chrono::Utc;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde::Serialize;
use uuid::Uuid;

/// Invoice lifecycle. A nota starts ABERTA, and the only transition is to
/// FECHADA (performed by the event consumer once stock has been reserved).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum StatusNota {
    #[serde(rename = "ABERTA")]
    Aberta,
    #[serde(rename = "FECHADA")]
    Fechada,
}

impl StatusNota {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Aberta => "ABERTA",
            Self::Fechada => "FECHADA",
        }
    }

    /// Inverse of `as_str`, for values read back from the database.
    pub fn parse(s: &str) -> Result<Self, String> {
        match s {
            "ABERTA" => Ok(Self::Aberta),
            "FECHADA" => Ok(Self::Fechada),
            outro => Err(format!("status de nota desconhecido: {outro:?}")),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FecharNotaErro {
    #[error("nota nao esta aberta")]
    NotaNaoAberta,
    #[error("nota sem itens nao pode ser fechada")]
    NotaSemItens,
}

/// The billing aggregate root. Items belong to the nota and may only be added
/// while it is ABERTA; attributes freeze once the nota is FECHADA.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotaFiscal {
    pub id: Uuid,
    pub numero: String,
    pub status: StatusNota,
    pub data_criacao: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_fechada: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub itens: Vec<ItemNota>,
}

impl NotaFiscal {
    pub fn nova(numero: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            numero,
            status: StatusNota::Aberta,
            data_criacao: Utc::now(),
            data_fechada: None,
            itens: Vec::new(),
        }
    }

    /// Close the nota: requires ABERTA and at least one item. Both failures
    /// are logical outcomes for the caller to map, not transport errors.
    pub fn fechar(&mut self, agora: DateTime<Utc>) -> Result<(), FecharNotaErro> {
        if self.status != StatusNota::Aberta {
            return Err(FecharNotaErro::NotaNaoAberta);
        }
        if self.itens.is_empty() {
            return Err(FecharNotaErro::NotaSemItens);
        }
        self.status = StatusNota::Fechada;
        self.data_fechada = Some(agora);
        Ok(())
    }

    pub fn total(&self) -> Decimal { self.itens.iter().map(ItemNota::subtotal).sum() }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemNota {
    pub id: Uuid,
    pub nota_id: Uuid,
    pub produto_id: Uuid,
    pub quantidade: i32,
    pub preco_unitario: Decimal,
}

impl ItemNota {
    pub fn novo(nota_id: Uuid, produto_id: Uuid, quantidade: i32, preco_unitario: Decimal) -> Self {
        Self {
            id: Uuid::new_v4(),
            nota_id,
            produto_id,
            quantidade,
            preco_unitario,
        }
    }

    pub fn subtotal(&self) -> Decimal { Decimal::from(self.quantidade) * self.preco_unitario }
}

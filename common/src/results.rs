use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Tabla con nombre dentro de un resultado: clave -> valor, tal cual la arma el worker.
pub type Table = serde_json::Map<String, Value>;

/// Tablas que aporta cada job de un barrido `dropq`.
pub const DROPQ_TABLES: [&str; 11] = [
    "mY_dec", "mX_dec", "df_dec", "pdf_dec", "cdf_dec", "mY_bin", "mX_bin", "df_bin", "pdf_bin",
    "cdf_bin", "fiscal_tots",
];

pub const FISCAL_TOTALS_TABLE: &str = "fiscal_tots";
pub const ELASTICITY_TABLE: &str = "elasticity_gdp";
pub const ELASTICITY_ROW: &str = "gdp_elasticity";
pub const DYNAMIC_TABLE: &str = "df_ogusa";

/// Una fila de totales re-ordenada: nombre canónico y valores por año.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TotalsRow {
    pub name: String,
    pub values: BTreeMap<u32, Value>,
}

/// Merge de todas las tablas parciales de un barrido `dropq`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateResult {
    /// Tablas mergeadas por nombre (`mY_dec`, `df_bin`, ...), sin `fiscal_tots`
    pub tables: BTreeMap<String, Table>,
    /// Totales fiscales en el orden canónico de filas
    pub fiscal_tots: Vec<TotalsRow>,
    /// Cuántos jobs aportaron resultado (los que fallaron al bajar se descartan)
    pub contributing_jobs: usize,
}

/// Resultado de un barrido de elasticidad (una sola tabla).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElasticResult {
    pub elasticity_gdp: Vec<TotalsRow>,
    pub contributing_jobs: usize,
}

/// Resultado de un job dinámico, según el estado que reportó el callback.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DynamicResult {
    DfOgusa(Table),
    JobFail(String),
}

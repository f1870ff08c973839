use std::collections::BTreeMap;

use common::{Table, TotalsRow};
use tracing::debug;

use crate::error::DispatchError;

/// Qué hacer con claves cuya fila no está en el orden canónico.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnknownRows {
    /// Totales fiscales: una fila desconocida es un error
    Reject,
    /// Elasticidad: se ignoran
    Ignore,
}

/// Separa una clave plana en (fila, año).
///
/// Si la clave coincide exactamente con una fila canónica, esa es la fila y el
/// año es su sufijo numérico (o 0). Si no, la forma es `<fila>_<año>`.
fn split_key<'a>(key: &'a str, rows: &[String]) -> (&'a str, Option<u32>) {
    let suffix_year = |k: &str| {
        k.rsplit_once('_')
            .and_then(|(_, y)| y.parse::<u32>().ok())
    };

    if rows.iter().any(|r| r == key) {
        return (key, Some(suffix_year(key).unwrap_or(0)));
    }

    match key.rsplit_once('_') {
        Some((row, year)) => match year.parse::<u32>() {
            Ok(y) => (row, Some(y)),
            Err(_) => (key, None),
        },
        None => (key, None),
    }
}

/// Re-ordena totales planos (`ind_tax_0`, `ind_tax_1`, ...) en filas
/// indexadas por año, en el orden que fija `rows`.
///
/// Filas canónicas sin datos salen vacías.
pub fn arrange_totals_by_row(
    totals: &Table,
    rows: &[String],
    unknown: UnknownRows,
) -> Result<Vec<TotalsRow>, DispatchError> {
    let mut out: Vec<TotalsRow> = rows
        .iter()
        .map(|name| TotalsRow {
            name: name.clone(),
            values: BTreeMap::new(),
        })
        .collect();

    for (key, value) in totals {
        let (row, year) = split_key(key, rows);
        let slot = year.and_then(|y| rows.iter().position(|r| r == row).map(|idx| (idx, y)));

        match (slot, unknown) {
            (Some((idx, y)), _) => {
                out[idx].values.insert(y, value.clone());
            }
            (None, UnknownRows::Reject) => {
                return Err(DispatchError::UnknownTotalsRow {
                    row: key.to_string(),
                });
            }
            (None, UnknownRows::Ignore) => {
                debug!("clave de totales {} fuera del orden canónico, se ignora", key);
            }
        }
    }

    Ok(out)
}

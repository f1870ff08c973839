use common::Table;
use serde_json::Value;

use crate::error::DispatchError;

pub use common::{DISPATCH_VERSION_FIELD, ENGINE_VERSION_FIELD, OGUSA_VERSION_FIELD};

/// Qué versiones se exigen a los workers que aportan resultados.
#[derive(Debug, Clone)]
pub struct VersionPolicy {
    pub enforce: bool,
    /// Versión esperada del motor estático; si falta, manda el primer resultado
    pub expected_engine: Option<String>,
    /// Ídem para el motor dinámico
    pub expected_ogusa: Option<String>,
    /// Versión de despacho de este build (comparación compatible)
    pub dispatch_version: String,
}

impl Default for VersionPolicy {
    fn default() -> Self {
        Self {
            enforce: false,
            expected_engine: None,
            expected_ogusa: None,
            dispatch_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Largo del prefijo de commit que los workers agregan a su versión.
const COMMIT_PREFIX_LEN: usize = 6;

/// Parte principal de una versión con formato `<versión>.<commit[..6]>`.
///
/// `0.6.a96303` -> `0.6`, `0.1.0.123456` -> `0.1.0`, `1.2.3+abc` -> `1.2.3`.
fn primary_version(v: &str) -> &str {
    let v = v.split(['+', '-']).next().unwrap_or(v);
    match v.rsplit_once('.') {
        Some((version, commit))
            if !version.is_empty()
                && commit.len() == COMMIT_PREFIX_LEN
                && commit.bytes().all(|b| b.is_ascii_hexdigit()) =>
        {
            version
        }
        _ => v,
    }
}

/// Comparación "compatible": tolera un sufijo de build/commit pero exige
/// que la versión principal coincida exactamente.
pub fn same_version(a: &str, b: &str) -> bool {
    primary_version(a) == primary_version(b)
}

fn version_field(result: &Table, field: &str) -> Option<String> {
    match result.get(field) {
        Some(Value::String(s)) => Some(s.clone()),
        Some(Value::Null) | None => None,
        Some(other) => Some(other.to_string()),
    }
}

/// Verifica que todos los resultados vengan de versiones consistentes.
///
/// - `engine_field` tiene que coincidir exactamente con `expected_engine`
///   (o con el del primer resultado si no hay versión esperada).
/// - `dropq_version` tiene que ser compatible con `dispatch_version`.
pub fn check_versions(
    results: &[Table],
    engine_field: &str,
    expected_engine: Option<&str>,
    dispatch_version: &str,
) -> Result<(), DispatchError> {
    let Some(first) = results.first() else {
        return Ok(());
    };

    let baseline = expected_engine
        .map(str::to_string)
        .or_else(|| version_field(first, engine_field));

    for r in results {
        let found = version_field(r, engine_field);
        if found.is_none() || found != baseline {
            return Err(DispatchError::VersionMismatch {
                component: engine_field.to_string(),
                expected: baseline.unwrap_or_default(),
                found,
            });
        }
    }

    for r in results {
        let found = version_field(r, DISPATCH_VERSION_FIELD);
        let ok = found
            .as_deref()
            .is_some_and(|v| same_version(v, dispatch_version));
        if !ok {
            return Err(DispatchError::VersionMismatch {
                component: DISPATCH_VERSION_FIELD.to_string(),
                expected: dispatch_version.to_string(),
                found,
            });
        }
    }

    Ok(())
}

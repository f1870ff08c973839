use serde::{Deserialize, Serialize};

/// Campos de un body `application/x-www-form-urlencoded`, en orden.
pub type FormFields = Vec<(String, String)>;

/// Una unidad de trabajo: un año simulado con sus modificaciones ya serializadas.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    /// Índice del año dentro del barrido (0 = primer año presupuestario)
    pub year: u32,
    /// JSON con las modificaciones del usuario, tal cual lo espera el worker
    pub user_mods: String,
}

impl Task {
    pub fn new(year: u32, user_mods: impl Into<String>) -> Self {
        Self {
            year,
            user_mods: user_mods.into(),
        }
    }

    pub fn form_fields(&self) -> FormFields {
        vec![
            ("user_mods".to_string(), self.user_mods.clone()),
            ("year".to_string(), self.year.to_string()),
        ]
    }
}

/// Payload de la ruta dinámica (un solo job largo con callback).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DynamicTask {
    pub ogusa_params: String,
    pub user_mods: String,
    pub first_year: u32,
    /// URL a la que el worker avisa cuando termina
    pub callback: String,
}

impl DynamicTask {
    pub fn form_fields(&self) -> FormFields {
        vec![
            ("ogusa_params".to_string(), self.ogusa_params.clone()),
            ("user_mods".to_string(), self.user_mods.clone()),
            ("first_year".to_string(), self.first_year.to_string()),
            ("callback".to_string(), self.callback.clone()),
        ]
    }
}

/// Construye una tarea por año en `start_year..num_years`.
///
/// Las modificaciones se envuelven como `{"<first_budget_year>": mods}`,
/// que es lo que los workers esperan en `user_mods`.
pub fn build_year_tasks(
    mods: &serde_json::Value,
    first_budget_year: u32,
    start_year: u32,
    num_years: u32,
) -> serde_json::Result<Vec<Task>> {
    let mut wrapped = serde_json::Map::new();
    wrapped.insert(first_budget_year.to_string(), mods.clone());
    let user_mods = serde_json::to_string(&wrapped)?;

    Ok((start_year..num_years)
        .map(|year| Task::new(year, user_mods.clone()))
        .collect())
}

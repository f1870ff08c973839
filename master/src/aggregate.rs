use std::collections::BTreeMap;

use common::{
    AggregateResult, CallbackStatus, DynamicResult, ElasticResult, SubmittedJob, Table,
    DROPQ_TABLES, DYNAMIC_TABLE, ELASTICITY_ROW, ELASTICITY_TABLE, FISCAL_TOTALS_TABLE,
};
use serde_json::Value;
use tracing::{info, warn};

use crate::client::WorkerClient;
use crate::dispatcher::Dispatcher;
use crate::error::DispatchError;
use crate::totals::{arrange_totals_by_row, UnknownRows};
use crate::versions::{check_versions, ENGINE_VERSION_FIELD, OGUSA_VERSION_FIELD};

/// Resultado parcial bajado de un job.
struct Partial {
    host: String,
    body: Table,
}

/// Saca una tabla de un resultado parcial. Algunos workers mandan cada tabla
/// como JSON embebido en un string.
fn table_of(partial: &Partial, name: &str) -> Result<Table, DispatchError> {
    match partial.body.get(name) {
        Some(Value::Object(t)) => Ok(t.clone()),
        Some(Value::String(raw)) => serde_json::from_str::<Table>(raw)
            .map_err(|e| DispatchError::malformed(&partial.host, format!("tabla {name}: {e}"))),
        Some(other) => Err(DispatchError::malformed(
            &partial.host,
            format!("tabla {name} no es un objeto: {other}"),
        )),
        None => Err(DispatchError::malformed(
            &partial.host,
            format!("falta la tabla {name}"),
        )),
    }
}

/// Agrega `part` a `acc`. Una misma clave aportada por dos jobs es un error.
fn merge_into(acc: &mut Table, part: Table, table: &str) -> Result<(), DispatchError> {
    for (key, value) in part {
        if acc.contains_key(&key) {
            return Err(DispatchError::KeyCollision {
                table: table.to_string(),
                key,
            });
        }
        acc.insert(key, value);
    }
    Ok(())
}

impl<C: WorkerClient> Dispatcher<C> {
    /// Baja el resultado de cada job. Best effort: un job cuyo host no
    /// responde o responde non-200 queda afuera del agregado.
    async fn fetch_partials(&self, jobs: &[SubmittedJob]) -> Result<Vec<Partial>, DispatchError> {
        let mut partials = Vec::with_capacity(jobs.len());

        for job in jobs {
            match self.client.retrieve_results(&job.host, &job.job_id).await {
                Ok(reply) if reply.is_success() => {
                    let body: Table = reply.json(&job.host)?;
                    partials.push(Partial {
                        host: job.host.clone(),
                        body,
                    });
                }
                Ok(reply) => warn!(
                    "resultado de {} en {} descartado (HTTP {})",
                    job.job_id, job.host, reply.status
                ),
                Err(e) => warn!(
                    "resultado de {} en {} descartado: {}",
                    job.job_id, job.host, e
                ),
            }
        }

        info!("{} de {} jobs aportaron resultado", partials.len(), jobs.len());
        Ok(partials)
    }

    fn check_static_versions(&self, partials: &[Partial]) -> Result<(), DispatchError> {
        let policy = &self.settings.versions;
        if !policy.enforce {
            return Ok(());
        }
        let bodies: Vec<Table> = partials.iter().map(|p| p.body.clone()).collect();
        check_versions(
            &bodies,
            ENGINE_VERSION_FIELD,
            policy.expected_engine.as_deref(),
            &policy.dispatch_version,
        )
    }

    /// Merge de las once tablas de un barrido completo; los totales fiscales
    /// salen re-ordenados por fila canónica.
    pub async fn dropq_get_results(
        &self,
        jobs: &[SubmittedJob],
    ) -> Result<AggregateResult, DispatchError> {
        let partials = self.fetch_partials(jobs).await?;
        self.check_static_versions(&partials)?;

        let mut tables: BTreeMap<String, Table> = DROPQ_TABLES
            .iter()
            .map(|name| (name.to_string(), Table::new()))
            .collect();

        for partial in &partials {
            for name in DROPQ_TABLES {
                let part = table_of(partial, name)?;
                if let Some(acc) = tables.get_mut(name) {
                    merge_into(acc, part, name)?;
                }
            }
        }

        let totals = tables.remove(FISCAL_TOTALS_TABLE).unwrap_or_default();
        let fiscal_tots =
            arrange_totals_by_row(&totals, &self.settings.total_row_names, UnknownRows::Reject)?;

        Ok(AggregateResult {
            tables,
            fiscal_tots,
            contributing_jobs: partials.len(),
        })
    }

    /// Igual que `dropq_get_results` pero con la única tabla de elasticidad.
    /// El año 0 no se calcula: se completa con `"NA"`.
    pub async fn elastic_get_results(
        &self,
        jobs: &[SubmittedJob],
    ) -> Result<ElasticResult, DispatchError> {
        let partials = self.fetch_partials(jobs).await?;
        self.check_static_versions(&partials)?;

        let mut merged = Table::new();
        for partial in &partials {
            merge_into(&mut merged, table_of(partial, ELASTICITY_TABLE)?, ELASTICITY_TABLE)?;
        }
        merged.insert(
            format!("{ELASTICITY_ROW}_0"),
            Value::String("NA".to_string()),
        );

        let rows = [ELASTICITY_ROW.to_string()];
        let elasticity_gdp = arrange_totals_by_row(&merged, &rows, UnknownRows::Ignore)?;

        Ok(ElasticResult {
            elasticity_gdp,
            contributing_jobs: partials.len(),
        })
    }

    /// Resultado de un job dinámico, tras su callback. A diferencia de los
    /// barridos, acá cualquier falla al bajar el resultado es fatal.
    pub async fn dynamic_get_results(
        &self,
        job: &SubmittedJob,
        status: CallbackStatus,
    ) -> Result<DynamicResult, DispatchError> {
        let reply = self
            .client
            .retrieve_results(&job.host, &job.job_id)
            .await
            .map_err(|e| e.at(&job.host))?;

        if !reply.is_success() {
            return Err(DispatchError::ResultUnavailable {
                job_id: job.job_id.clone(),
                host: job.host.clone(),
                status: reply.status,
            });
        }

        if status == CallbackStatus::Failure {
            warn!("job dinámico {} terminó con falla", job.job_id);
            return Ok(DynamicResult::JobFail(reply.body));
        }

        let partial = Partial {
            host: job.host.clone(),
            body: reply.json(&job.host)?,
        };

        // sin versión esperada manda la del propio resultado, que igual
        // tiene que estar presente
        let policy = &self.settings.versions;
        if policy.enforce {
            check_versions(
                std::slice::from_ref(&partial.body),
                OGUSA_VERSION_FIELD,
                policy.expected_ogusa.as_deref(),
                &policy.dispatch_version,
            )?;
        }

        Ok(DynamicResult::DfOgusa(table_of(&partial, DYNAMIC_TABLE)?))
    }
}

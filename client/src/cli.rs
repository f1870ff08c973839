use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use common::{
    DynamicInfo, DynamicRequest, DynamicResult, PoolInfo, SweepInfo, SweepKind, SweepRequest,
    SweepResults, TotalsRow,
};
use reqwest::{Client, StatusCode};
use serde_json::Value;
use std::{env, fs};

/// - En Docker: MASTER_URL=http://master:8080
/// - Local: default http://localhost:8080
fn master_base_url() -> String {
    env::var("MASTER_URL").unwrap_or_else(|_| "http://localhost:8080".to_string())
}

#[derive(Parser)]
#[command(name = "client")]
#[command(about = "CLI simple para despachar barridos contra el master")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum Kind {
    /// Tablas completas, años 0..N
    Dropq,
    /// Elasticidad del PIB, años 1..N
    Elastic,
}

impl From<Kind> for SweepKind {
    fn from(k: Kind) -> Self {
        match k {
            Kind::Dropq => SweepKind::Dropq,
            Kind::Elastic => SweepKind::Elastic,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Despacha un barrido: un job por año
    Submit {
        /// JSON con las modificaciones, o @archivo.json
        #[arg(value_name = "MODS")]
        mods: String,

        #[arg(long, default_value_t = 2017)]
        first_year: u32,

        #[arg(long, value_enum, default_value_t = Kind::Dropq)]
        kind: Kind,
    },
    /// Despacha un job dinámico (submit + registro de callback)
    Dynamic {
        /// JSON con las modificaciones, o @archivo.json
        #[arg(value_name = "MODS")]
        mods: String,

        /// Parámetros del modelo dinámico (JSON o @archivo.json)
        #[arg(long, default_value = "{}")]
        params: String,

        #[arg(long, default_value_t = 2017)]
        first_year: u32,
    },
    /// Consulta el estado de un barrido
    Status {
        #[arg(value_name = "SWEEP_ID")]
        id: String,
    },
    /// Muestra el resultado consolidado de un barrido
    Results {
        #[arg(value_name = "SWEEP_ID")]
        id: String,
    },
    /// Consulta el estado de un job dinámico
    DynamicStatus {
        #[arg(value_name = "RUN_ID")]
        id: String,
    },
    /// Pools de workers, offset de rotación y cursor
    Workers,
}

/// Acepta JSON literal o `@ruta` a un archivo con JSON.
fn read_json_arg(raw: &str) -> Result<Value> {
    let text = match raw.strip_prefix('@') {
        Some(path) => fs::read_to_string(path).with_context(|| format!("no se pudo leer {path}"))?,
        None => raw.to_string(),
    };
    serde_json::from_str(&text).context("JSON inválido")
}

async fn error_body(resp: reqwest::Response) -> String {
    let status = resp.status();
    let body: Value = resp.json().await.unwrap_or(Value::Null);
    match body.get("error").and_then(Value::as_str) {
        Some(msg) => format!("{status}: {msg}"),
        None => status.to_string(),
    }
}

fn print_rows(rows: &[TotalsRow]) {
    for row in rows {
        let values: Vec<String> = row
            .values
            .iter()
            .map(|(year, v)| format!("{year}={v}"))
            .collect();
        println!("  {:<16} {}", row.name, values.join("  "));
    }
}

fn print_sweep(info: &SweepInfo) {
    println!("Barrido:");
    println!("  id: {}", info.id);
    println!("  clase: {:?}", info.kind);
    println!("  estado: {:?}", info.status);
    println!("  jobs: {}/{} listos", info.completed_jobs, info.jobs.len());
    println!("  cola máxima: {}", info.max_queue_length);
    if let Some(err) = &info.error {
        println!("  error: {err}");
    }
}

fn print_dynamic(info: &DynamicInfo) {
    println!("Job dinámico:");
    println!("  id: {}", info.id);
    println!("  job: {} en {}", info.job.job_id, info.job.host);
    if let Some(guid) = &info.guid {
        println!("  guid: {guid}");
    }
    println!("  estado: {:?}", info.status);
    match &info.result {
        Some(DynamicResult::DfOgusa(table)) => println!("  df_ogusa: {} claves", table.len()),
        Some(DynamicResult::JobFail(msg)) => println!("  falla: {msg}"),
        None => {}
    }
}

pub async fn run() -> Result<()> {
    let cli = Cli::parse();
    let client = Client::new();
    let base_url = master_base_url();

    match cli.command {
        Commands::Submit {
            mods,
            first_year,
            kind,
        } => {
            let req = SweepRequest {
                kind: kind.into(),
                first_budget_year: first_year,
                user_mods: read_json_arg(&mods)?,
            };

            let url = format!("{}/api/v1/sweeps", base_url);
            let resp = client.post(&url).json(&req).send().await?;
            if !resp.status().is_success() {
                bail!("el master rechazó el barrido: {}", error_body(resp).await);
            }

            let info: SweepInfo = resp.json().await?;
            print_sweep(&info);
            for job in &info.jobs {
                println!("    - {} @ {}", job.job_id, job.host);
            }
        }
        Commands::Dynamic {
            mods,
            params,
            first_year,
        } => {
            let req = DynamicRequest {
                first_budget_year: first_year,
                ogusa_params: read_json_arg(&params)?,
                user_mods: read_json_arg(&mods)?,
            };

            let url = format!("{}/api/v1/dynamic", base_url);
            let resp = client.post(&url).json(&req).send().await?;
            if !resp.status().is_success() {
                bail!("el master rechazó el job dinámico: {}", error_body(resp).await);
            }

            let info: DynamicInfo = resp.json().await?;
            print_dynamic(&info);
        }
        Commands::Status { id } => {
            let url = format!("{}/api/v1/sweeps/{id}", base_url);
            let resp = client.get(&url).send().await?;

            if resp.status().is_success() {
                let info: SweepInfo = resp.json().await?;
                print_sweep(&info);
            } else {
                println!("No se encontró el barrido con id {id}");
            }
        }
        Commands::Results { id } => {
            let url = format!("{}/api/v1/sweeps/{id}/results", base_url);
            let resp = client.get(&url).send().await?;

            match resp.status() {
                StatusCode::OK => match resp.json::<SweepResults>().await? {
                    SweepResults::Dropq(agg) => {
                        println!("Resultado ({} jobs aportaron):", agg.contributing_jobs);
                        for (name, table) in &agg.tables {
                            println!("  {:<16} {} claves", name, table.len());
                        }
                        println!("Totales fiscales:");
                        print_rows(&agg.fiscal_tots);
                    }
                    SweepResults::Elastic(res) => {
                        println!("Elasticidad ({} jobs aportaron):", res.contributing_jobs);
                        print_rows(&res.elasticity_gdp);
                    }
                },
                StatusCode::ACCEPTED => println!("El barrido {id} todavía está corriendo"),
                StatusCode::CONFLICT => println!("El barrido {id} falló; ver `status {id}`"),
                _ => println!("No se encontró el barrido con id {id}"),
            }
        }
        Commands::DynamicStatus { id } => {
            let url = format!("{}/api/v1/dynamic/{id}", base_url);
            let resp = client.get(&url).send().await?;

            if resp.status().is_success() {
                let info: DynamicInfo = resp.json().await?;
                print_dynamic(&info);
            } else {
                println!("No se encontró el job dinámico con id {id}");
            }
        }
        Commands::Workers => {
            let url = format!("{}/api/v1/workers", base_url);
            let pools: Vec<PoolInfo> = client.get(&url).send().await?.json().await?;

            for pool in pools {
                println!("Pool {} (posición {}):", pool.name, pool.position);
                for (i, host) in pool.hosts.iter().enumerate() {
                    let mark = if i == pool.position { "->" } else { "  " };
                    println!("  {mark} {host}");
                }
            }
        }
    }

    Ok(())
}

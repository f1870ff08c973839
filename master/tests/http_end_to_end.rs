//! Cliente HTTP real contra workers de prueba servidos en puertos efímeros.

use std::time::Duration;

use common::{
    DynamicInfo, DynamicResult, RunStatus, SweepInfo, SweepResults, CALLBACK_PATH,
};
use master::{
    handlers::build_router, monitor::monitor_sweeps, pool::WorkerPool, rotation::HostRotation,
    state::AppState, versions::VersionPolicy, DispatchError, DispatchSettings, Dispatcher,
    HttpWorkerClient,
};
use serde_json::json;
use tokio::net::TcpListener;
use worker::{StubConfig, StubState};

async fn spawn_stub(config: StubConfig) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = worker::build_router(StubState::new(config));
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr.to_string()
}

fn dispatcher(
    static_hosts: Vec<String>,
    dynamic_hosts: Vec<String>,
    settings: DispatchSettings,
) -> Dispatcher<HttpWorkerClient> {
    Dispatcher::new(
        HttpWorkerClient::new(Duration::from_secs(2), Duration::from_secs(5)),
        WorkerPool::new("dropq", static_hosts).unwrap(),
        WorkerPool::new("ogusa", dynamic_hosts).unwrap(),
        HostRotation::in_memory(),
        settings,
    )
}

fn enforcing() -> DispatchSettings {
    DispatchSettings {
        versions: VersionPolicy {
            enforce: true,
            ..VersionPolicy::default()
        },
        ..DispatchSettings::default()
    }
}

#[tokio::test]
async fn barrido_dropq_de_punta_a_punta() {
    let waiting = StubConfig {
        wait_polls: 1,
        ..StubConfig::default()
    };
    let a = spawn_stub(waiting.clone()).await;
    let b = spawn_stub(waiting).await;
    let d = dispatcher(vec![a.clone(), b.clone()], vec![a.clone()], enforcing());

    let sub = d
        .submit_dropq_calculation(&json!({"_II_em": [4000]}), 2017)
        .await
        .unwrap();
    assert_eq!(sub.jobs.len(), 10);
    assert_eq!(sub.jobs[0].host, a);
    assert_eq!(sub.jobs[1].host, b);

    // cada job responde NO una vez
    assert!(d.results_ready(&sub.jobs).await.unwrap().iter().all(|r| !r));
    assert!(d.results_ready(&sub.jobs).await.unwrap().iter().all(|r| *r));

    let agg = d.dropq_get_results(&sub.jobs).await.unwrap();
    assert_eq!(agg.contributing_jobs, 10);
    assert_eq!(agg.fiscal_tots.len(), 3);
    assert_eq!(agg.fiscal_tots[0].name, "ind_tax");
    assert_eq!(agg.fiscal_tots[0].values.len(), 10);
    assert_eq!(agg.tables["df_bin"].len(), 10);
}

#[tokio::test]
async fn nodo_caido_intermitente_no_impide_el_barrido() {
    let down = spawn_stub(StubConfig {
        node_down: true,
        ..StubConfig::default()
    })
    .await;
    let up = spawn_stub(StubConfig::default()).await;
    let d = dispatcher(vec![down, up.clone()], vec![up], DispatchSettings::default());

    let sub = d
        .submit_elastic_calculation(&json!({"_II_em": [4000]}), 2017)
        .await
        .unwrap();
    assert_eq!(sub.jobs.len(), 9);

    let res = d.elastic_get_results(&sub.jobs).await.unwrap();
    assert_eq!(res.contributing_jobs, 9);
    assert_eq!(res.elasticity_gdp[0].values.len(), 10);
    assert_eq!(res.elasticity_gdp[0].values[&0], json!("NA"));
}

#[tokio::test]
async fn versiones_distintas_entre_workers_se_rechazan() {
    let a = spawn_stub(StubConfig::default()).await;
    let b = spawn_stub(StubConfig {
        engine_version: "0.7.0".to_string(),
        ..StubConfig::default()
    })
    .await;
    let d = dispatcher(vec![a.clone(), b], vec![a], enforcing());

    let sub = d
        .submit_dropq_calculation(&json!({"_II_em": [4000]}), 2017)
        .await
        .unwrap();
    let err = d.dropq_get_results(&sub.jobs).await.unwrap_err();
    assert!(matches!(err, DispatchError::VersionMismatch { .. }));
}

#[tokio::test]
async fn job_dinamico_completo_via_callback() {
    let stub = spawn_stub(StubConfig {
        callback_delay: Duration::from_millis(200),
        ..StubConfig::default()
    })
    .await;

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let master_addr = listener.local_addr().unwrap();

    let settings = DispatchSettings {
        callback_url: format!("http://{master_addr}{CALLBACK_PATH}"),
        ..DispatchSettings::default()
    };
    let state = AppState::new(
        dispatcher(vec![stub.clone()], vec![stub], settings),
        Duration::from_millis(50),
    );
    let app = build_router(state);
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let http = reqwest::Client::new();
    let info: DynamicInfo = http
        .post(format!("http://{master_addr}/api/v1/dynamic"))
        .json(&json!({"first_budget_year": 2017, "ogusa_params": {"g_y": 0.03}, "user_mods": {"x": 1}}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(info.guid.is_some());

    let mut last = info;
    for _ in 0..100 {
        if last.status != RunStatus::Running {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
        last = http
            .get(format!("http://{master_addr}/api/v1/dynamic/{}", last.id))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
    }

    assert_eq!(last.status, RunStatus::Succeeded);
    let Some(DynamicResult::DfOgusa(table)) = last.result else {
        panic!("se esperaba df_ogusa");
    };
    assert_eq!(table["Y_2017"], json!(1.0));
}

#[tokio::test]
async fn barrido_via_master_con_monitor() {
    let stub = spawn_stub(StubConfig {
        wait_polls: 2,
        ..StubConfig::default()
    })
    .await;

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let master_addr = listener.local_addr().unwrap();
    let state = AppState::new(
        dispatcher(vec![stub.clone()], vec![stub], enforcing()),
        Duration::from_millis(20),
    );
    let app = build_router(state.clone());
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    tokio::spawn(monitor_sweeps(state));

    let http = reqwest::Client::new();
    let info: SweepInfo = http
        .post(format!("http://{master_addr}/api/v1/sweeps"))
        .json(&json!({"kind": "elastic", "first_budget_year": 2017, "user_mods": {"_II_em": [4000]}}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    let url = format!("http://{master_addr}/api/v1/sweeps/{}/results", info.id);
    let mut results = None;
    for _ in 0..200 {
        let resp = http.get(&url).send().await.unwrap();
        if resp.status() == reqwest::StatusCode::OK {
            results = Some(resp.json::<SweepResults>().await.unwrap());
            break;
        }
        assert_eq!(resp.status(), reqwest::StatusCode::ACCEPTED);
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    let Some(SweepResults::Elastic(res)) = results else {
        panic!("el barrido no terminó");
    };
    assert_eq!(res.contributing_jobs, 9);
}

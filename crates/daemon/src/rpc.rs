// SPDX-License-Identifier: MIT

//! JSON-RPC 2.0 dispatch (spec.md §4.10, C10): one `axum` router shared
//! by the public (`rpc_addr`) and internal/loopback (`internal_addr`)
//! listeners, both backed by the same [`ConManager`]. Every method in
//! `conman_wire::methods` has one match arm here; params/result types
//! are whatever that method's wire struct says.

use crate::lifecycle;
use crate::machine::Machine;
use crate::manager::ConManager;
use axum::extract::State;
use axum::response::{IntoResponse, Json};
use axum::routing::post;
use axum::Router;
use conman_core::Error;
use conman_wire::*;
use std::sync::Arc;
use tracing::warn;

pub fn router(manager: Arc<ConManager>) -> Router {
    Router::new().route("/", post(handle)).with_state(manager)
}

async fn handle(State(manager): State<Arc<ConManager>>, Json(request): Json<RpcRequest<serde_json::Value>>) -> impl IntoResponse {
    let id = request.id.clone();
    match dispatch(&manager, &request.method, request.params).await {
        Ok(result) => Json(RpcResponse::ok(id, result)),
        Err(err) => Json(RpcResponse::err(id, RpcError::from_core_error(&err))),
    }
}

async fn dispatch(manager: &Arc<ConManager>, method: &str, params: serde_json::Value) -> Result<serde_json::Value, Error> {
    macro_rules! call {
        ($params_ty:ty, $body:expr) => {{
            let params: $params_ty = serde_json::from_value(params)
                .map_err(|e| Error::Unsupported("malformed params").context(e.to_string()))?;
            let result = $body(params).await?;
            serde_json::to_value(result).map_err(|e| Error::Unsupported("result encoding failed").context(e.to_string()))
        }};
    }

    match method {
        "Ping" => call!(PingParams, |_: PingParams| async { Ok::<_, Error>(PingResult { ok: true }) }),
        "Create" => call!(CreateParams, |p: CreateParams| create(manager, p)),
        "ListContainers" => call!(ListContainersParams, |_: ListContainersParams| list_containers(manager)),
        "GetByID" => call!(GetByIdParams, |p: GetByIdParams| get_by_id(manager, p)),
        "GetByName" => call!(GetByNameParams, |p: GetByNameParams| get_by_name(manager, p)),
        "GetDefaultContainer" => {
            call!(GetDefaultContainerParams, |_: GetDefaultContainerParams| get_default_container(manager))
        }
        "SetDefaultContainer" => call!(SetDefaultContainerParams, |p: SetDefaultContainerParams| set_default_container(manager, p)),
        "GetDefaultUsername" => call!(GetDefaultUsernameParams, |p: GetDefaultUsernameParams| get_default_username(manager, p)),
        "SetDefaultUsername" => call!(SetDefaultUsernameParams, |p: SetDefaultUsernameParams| set_default_username(manager, p)),
        "ContainerStart" => call!(ContainerStartParams, |p: ContainerStartParams| container_start(manager, p)),
        "ContainerStop" => call!(ContainerStopParams, |p: ContainerStopParams| container_stop(manager, p)),
        "ContainerRestart" => call!(ContainerRestartParams, |p: ContainerRestartParams| container_restart(manager, p)),
        "ContainerDelete" => call!(ContainerDeleteParams, |p: ContainerDeleteParams| container_delete(manager, p)),
        "ContainerRename" => call!(ContainerRenameParams, |p: ContainerRenameParams| container_rename(manager, p)),
        "ContainerGetLogs" => call!(ContainerGetLogsParams, |p: ContainerGetLogsParams| container_get_logs(manager, p)),
        "InternalReportStopped" => {
            call!(InternalReportStoppedParams, |p: InternalReportStoppedParams| internal_report_stopped(manager, p))
        }
        other => Err(Error::Unsupported("unknown method").context(other.to_string())),
    }
}

fn require(manager: &ConManager, id: conman_core::MachineId) -> Result<Arc<Machine>, Error> {
    manager.get(id).ok_or(Error::NotFoundById(id))
}

async fn create(manager: &Arc<ConManager>, p: CreateParams) -> Result<CreateResult, Error> {
    let machine = manager.create(&p.name, p.image, p.config).await?;
    Ok(CreateResult { container: machine.record().into() })
}

async fn list_containers(manager: &Arc<ConManager>) -> Result<ListContainersResult, Error> {
    let containers = manager.list().iter().map(|m| m.record().into()).collect();
    Ok(ListContainersResult { containers })
}

async fn get_by_id(manager: &Arc<ConManager>, p: GetByIdParams) -> Result<GetByIdResult, Error> {
    Ok(GetByIdResult { container: require(manager, p.id)?.record().into() })
}

async fn get_by_name(manager: &Arc<ConManager>, p: GetByNameParams) -> Result<GetByNameResult, Error> {
    let machine = manager.get_by_name(&p.name).ok_or_else(|| Error::NotFoundByName(p.name.clone()))?;
    Ok(GetByNameResult { container: machine.record().into() })
}

async fn get_default_container(manager: &Arc<ConManager>) -> Result<GetDefaultContainerResult, Error> {
    Ok(GetDefaultContainerResult { container: manager.default_machine().map(|m| m.record().into()) })
}

async fn set_default_container(manager: &Arc<ConManager>, p: SetDefaultContainerParams) -> Result<SetDefaultContainerResult, Error> {
    require(manager, p.id)?;
    manager.set_default(p.id)?;
    Ok(SetDefaultContainerResult)
}

async fn get_default_username(manager: &Arc<ConManager>, p: GetDefaultUsernameParams) -> Result<GetDefaultUsernameResult, Error> {
    let machine = require(manager, p.id)?;
    Ok(GetDefaultUsernameResult { username: machine.record().config.default_username })
}

async fn set_default_username(manager: &Arc<ConManager>, p: SetDefaultUsernameParams) -> Result<SetDefaultUsernameResult, Error> {
    let machine = require(manager, p.id)?;
    machine.with_record_mut(manager.store(), |r| r.config.default_username = p.username.clone())?;
    Ok(SetDefaultUsernameResult)
}

async fn container_start(manager: &Arc<ConManager>, p: ContainerStartParams) -> Result<ContainerStartResult, Error> {
    let machine = require(manager, p.id)?;
    lifecycle::start(manager, &machine).await?;
    Ok(ContainerStartResult { container: machine.record().into() })
}

async fn container_stop(manager: &Arc<ConManager>, p: ContainerStopParams) -> Result<ContainerStopResult, Error> {
    let machine = require(manager, p.id)?;
    lifecycle::stop(manager, &machine, p.kill_processes).await?;
    Ok(ContainerStopResult { container: machine.record().into() })
}

async fn container_restart(manager: &Arc<ConManager>, p: ContainerRestartParams) -> Result<ContainerRestartResult, Error> {
    let machine = require(manager, p.id)?;
    lifecycle::restart(manager, &machine).await?;
    Ok(ContainerRestartResult { container: machine.record().into() })
}

async fn container_delete(manager: &Arc<ConManager>, p: ContainerDeleteParams) -> Result<ContainerDeleteResult, Error> {
    manager.delete_external(p.id).await?;
    Ok(ContainerDeleteResult)
}

async fn container_rename(manager: &Arc<ConManager>, p: ContainerRenameParams) -> Result<ContainerRenameResult, Error> {
    manager.rename(p.id, &p.new_name).await?;
    let machine = require(manager, p.id)?;
    Ok(ContainerRenameResult { container: machine.record().into() })
}

async fn container_get_logs(manager: &Arc<ConManager>, p: ContainerGetLogsParams) -> Result<ContainerGetLogsResult, Error> {
    let machine = require(manager, p.id)?;
    let record = machine.record();
    let log_path = manager.config().log_path(&record.name);
    let console_path = manager.config().log_path(&format!("{}-console", record.name));
    let log = tail_file(&log_path, p.tail_lines).await;
    let log_console = tail_file(&console_path, p.tail_lines).await;
    Ok(ContainerGetLogsResult { log, log_console })
}

async fn tail_file(path: &std::path::Path, tail_lines: Option<u32>) -> String {
    let Ok(text) = tokio::fs::read_to_string(path).await else {
        return String::new();
    };
    match tail_lines {
        Some(n) => text.lines().rev().take(n as usize).collect::<Vec<_>>().into_iter().rev().collect::<Vec<_>>().join("\n"),
        None => text,
    }
}

/// Returns before `refresh_state` finishes: the in-VM post-stop hook
/// calling this must not block on the full `onStop` teardown sequence
/// (spec §4.10, "must return synchronously before triggering the
/// reconciliation asynchronously").
async fn internal_report_stopped(manager: &Arc<ConManager>, p: InternalReportStoppedParams) -> Result<InternalReportStoppedResult, Error> {
    if let Some(machine) = manager.get(p.id) {
        let manager = Arc::clone(manager);
        tokio::spawn(async move {
            lifecycle::report_stopped(&manager, &machine).await;
        });
    } else {
        warn!(id = %p.id, "InternalReportStopped for unknown machine");
    }
    Ok(InternalReportStoppedResult)
}

use std::net::SocketAddr;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use color_eyre::eyre::Result;
use libjobwatch::aggregate::{JobState, SearchFilter, UnknownJobState};
use libjobwatch::event::{decode_events, EventId};
use libjobwatch::log::*;
use libjobwatch::queue::EventQueue;
use libjobwatch::view::ViewSnapshot;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use time::OffsetDateTime;

use crate::state::{JobId, SharedState};

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("No job with id {0}.")]
    UnknownJob(JobId),
    #[error(transparent)]
    UnknownStatus(#[from] UnknownJobState),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self {
            ApiError::UnknownJob(_) => StatusCode::NOT_FOUND,
            ApiError::UnknownStatus(_) => StatusCode::BAD_REQUEST,
        };
        debug!("request failed: {}", self);
        let body = Json(serde_json::json!({ "error": self.to_string() }));
        (status, body).into_response()
    }
}

pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/api/jobs/:job_id", get(job_view).delete(drop_job))
        .route("/api/jobs/:job_id/events", post(push_events))
        .route("/api/jobs/:job_id/status", put(change_status))
        .route("/api/jobs/:job_id/select", post(select))
        .with_state(state)
}

pub async fn run_server(port: u16, state: SharedState) -> Result<()> {
    let app = router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!("listening on {}", addr);
    axum::Server::bind(&addr)
        .serve(app.into_make_service())
        .await
        .map_err(|e| e.into())
}

async fn root() -> &'static str {
    "jobwatch-server"
}

#[derive(Serialize, Deserialize, Debug, PartialEq, Eq)]
pub struct PushReport {
    accepted: usize,
    malformed: usize,
    finished: bool,
}

async fn push_events(
    Path(job_id): Path<JobId>,
    State(state): State<SharedState>,
    Json(records): Json<Vec<Value>>,
) -> Json<PushReport> {
    debug!("job {}: {} records pushed", job_id, records.len());
    let (events, malformed) = decode_events(records);
    let mut state = state.lock().await;
    let aggregator = state.job_mut(job_id);
    aggregator.record_malformed(malformed);
    let accepted = aggregator.process_queue(&mut EventQueue::from(events));
    Json(PushReport {
        accepted,
        malformed,
        finished: aggregator.is_finished(),
    })
}

async fn job_view(
    Path(job_id): Path<JobId>,
    State(state): State<SharedState>,
) -> Result<Json<ViewSnapshot>, ApiError> {
    let state = state.lock().await;
    state
        .job(job_id)
        .map(|aggregator| Json(aggregator.snapshot()))
        .ok_or(ApiError::UnknownJob(job_id))
}

#[derive(Deserialize, Debug)]
struct StatusChange {
    status: String,
    #[serde(default, with = "time::serde::rfc3339::option")]
    at: Option<OffsetDateTime>,
}

/// Out-of-band job status, e.g. the job was canceled before it finished.
async fn change_status(
    Path(job_id): Path<JobId>,
    State(state): State<SharedState>,
    Json(change): Json<StatusChange>,
) -> Result<Json<ViewSnapshot>, ApiError> {
    let status: JobState = change.status.parse()?;
    let at = change.at.unwrap_or_else(OffsetDateTime::now_utc);
    let mut state = state.lock().await;
    let aggregator = state.job_mut(job_id);
    if !aggregator.set_job_status(status, at) {
        debug!("job {} ignored status change to {}", job_id, status);
    }
    Ok(Json(aggregator.snapshot()))
}

#[derive(Deserialize, Debug)]
struct Selection {
    #[serde(default)]
    play: Option<EventId>,
    #[serde(default)]
    task: Option<EventId>,
    #[serde(default)]
    filter: Option<SearchFilter>,
}

async fn select(
    Path(job_id): Path<JobId>,
    State(state): State<SharedState>,
    Json(selection): Json<Selection>,
) -> Result<Json<ViewSnapshot>, ApiError> {
    debug!("job {}: selecting {:?}", job_id, selection);
    let mut state = state.lock().await;
    let aggregator = state
        .existing_job_mut(job_id)
        .ok_or(ApiError::UnknownJob(job_id))?;
    if let Some(filter) = selection.filter {
        aggregator.set_filter(filter);
    }
    aggregator.select_play(selection.play);
    aggregator.select_task(selection.task);
    Ok(Json(aggregator.snapshot()))
}

async fn drop_job(
    Path(job_id): Path<JobId>,
    State(state): State<SharedState>,
) -> Result<StatusCode, ApiError> {
    let mut state = state.lock().await;
    state
        .remove(job_id)
        .map(|_| StatusCode::NO_CONTENT)
        .ok_or(ApiError::UnknownJob(job_id))
}

#[cfg(test)]
mod test {
    use color_eyre::eyre::Result;
    use libjobwatch::config::AggregatorConfig;
    use serde_json::json;

    use super::*;
    use crate::state::ServerState;

    fn state() -> SharedState {
        ServerState::new(AggregatorConfig::default()).shared()
    }

    fn job_events() -> Vec<Value> {
        vec![
            json!({ "id": 1, "event": "playbook_on_start", "created": "2015-03-03T21:00:00Z" }),
            json!({ "id": 2, "event": "playbook_on_play_start", "created": "2015-03-03T21:00:01Z", "play": "deploy" }),
            json!({ "id": 3, "event": "playbook_on_task_start", "parent": 2, "created": "2015-03-03T21:00:02Z", "task": "ping" }),
            json!({ "id": 4, "event_name": "runner_on_ok", "parent": 3, "host": 1, "host_name": "web01", "created": "2015-03-03T21:00:03Z" }),
            json!({ "id": "five", "event": "runner_on_ok" }),
        ]
    }

    async fn error_body(err: ApiError) -> Result<(StatusCode, Value)> {
        let response = err.into_response();
        let status = response.status();
        let bytes = hyper::body::to_bytes(response.into_body()).await?;
        Ok((status, serde_json::from_slice(&bytes)?))
    }

    #[tokio::test]
    async fn test_router_builds() {
        let _ = router(state());
        assert_eq!("jobwatch-server", root().await);
    }

    #[tokio::test]
    async fn test_pushed_events_show_up_in_the_view() -> Result<()> {
        let state = state();
        let Json(report) = push_events(Path(7), State(state.clone()), Json(job_events())).await;
        assert_eq!(
            PushReport {
                accepted: 4,
                malformed: 1,
                finished: false,
            },
            report
        );

        let Ok(Json(view)) = job_view(Path(7), State(state)).await else {
            panic!("job 7 should exist");
        };
        assert_eq!(&JobState::Running, view.job_status().status());
        assert_eq!("00:00:03", view.job_status().elapsed());
        assert_eq!(&Some(2), view.active_play());
        assert_eq!("web01", view.host_results()[0].name());
        assert_eq!(1, *view.host_summary().total());
        assert_eq!(1, *view.ignored().malformed());
        Ok(())
    }

    #[tokio::test]
    async fn test_unknown_jobs_are_not_found() -> Result<()> {
        let state = state();
        let Err(err) = job_view(Path(9), State(state.clone())).await else {
            panic!("job 9 shouldn't exist");
        };
        let (status, body) = error_body(err).await?;
        assert_eq!(StatusCode::NOT_FOUND, status);
        assert_eq!("No job with id 9.", body["error"]);

        let selection = Selection {
            play: Some(1),
            task: None,
            filter: None,
        };
        assert!(matches!(
            select(Path(9), State(state.clone()), Json(selection)).await,
            Err(ApiError::UnknownJob(9))
        ));
        assert!(matches!(
            drop_job(Path(9), State(state)).await,
            Err(ApiError::UnknownJob(9))
        ));
        Ok(())
    }

    #[tokio::test]
    async fn test_status_changes() -> Result<()> {
        let state = state();
        let change: StatusChange =
            serde_json::from_value(json!({ "status": "canceled", "at": "2015-03-03T21:00:00Z" }))?;
        let Ok(Json(view)) = change_status(Path(7), State(state.clone()), Json(change)).await else {
            panic!("status change should apply");
        };
        assert_eq!(&JobState::Canceled, view.job_status().status());
        assert!(state.lock().await.job(7).is_some_and(|job| job.is_finished()));

        let change: StatusChange = serde_json::from_value(json!({ "status": "exploded" }))?;
        let Err(err) = change_status(Path(7), State(state), Json(change)).await else {
            panic!("unknown status should be rejected");
        };
        let (status, body) = error_body(err).await?;
        assert_eq!(StatusCode::BAD_REQUEST, status);
        assert_eq!("Unknown job status `exploded`.", body["error"]);
        Ok(())
    }

    #[tokio::test]
    async fn test_selection_and_teardown() -> Result<()> {
        let state = state();
        push_events(Path(7), State(state.clone()), Json(job_events())).await;

        let selection: Selection = serde_json::from_value(
            json!({ "play": 2, "task": 3, "filter": { "failed_only": true } }),
        )?;
        let Ok(Json(view)) = select(Path(7), State(state.clone()), Json(selection)).await else {
            panic!("job 7 should exist");
        };
        // The failure filter clears the results, even though nothing moved.
        assert_eq!(&Some(3), view.active_task());
        assert!(view.host_results().is_empty());
        assert!(*view.filter().failed_only());

        assert!(matches!(
            drop_job(Path(7), State(state.clone())).await,
            Ok(StatusCode::NO_CONTENT)
        ));
        assert!(state.lock().await.job(7).is_none());
        Ok(())
    }
}

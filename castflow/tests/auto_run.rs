//! Automatic runs: advancing, stop, cancel, backoff and edit preservation.

mod common;

use castflow::backend::CheckResponse;
use castflow::catalog::{StageId, StageParams};
use castflow::config::CoordinatorConfig;
use castflow::core::{StepStatus, SubTaskStatus};
use castflow::errors::{CastflowError, PollError};
use castflow::events;
use castflow::polling::PollConfig;
use castflow::propagation::PropagationPolicy;
use castflow::testing::{BackendCall, ScriptedBackend};
use castflow::workflow::{AutoMode, ExecutionMode};
use common::Harness;
use pretty_assertions::assert_eq;
use std::time::Duration;

fn ms(values: &[u64]) -> Vec<Duration> {
    values.iter().copied().map(Duration::from_millis).collect()
}

#[tokio::test]
async fn run_to_publish_advances_through_every_stage() {
    let mut config = CoordinatorConfig::default();
    config.propagation.resource_base_url = Some("https://cdn.test/".to_string());
    let harness = Harness::with_config(config);
    harness.fill_user_inputs();

    let report = harness
        .coordinator
        .run_auto(AutoMode::ToPublish)
        .await
        .unwrap();

    assert_eq!(report.completed, StageId::ALL.to_vec());
    assert!(!report.stopped);
    assert_eq!(harness.backend.kickoffs(), StageId::ALL.to_vec());
    assert!(harness
        .coordinator
        .steps()
        .iter()
        .all(|step| step.status == StepStatus::Success && step.finished_at.is_some()));
    assert_eq!(harness.coordinator.mode(), ExecutionMode::Manual);
    assert_eq!(harness.coordinator.main_task().map(|t| t.id), Some(report.main_task_id));

    // One scheduled poll per stage, one advance pause between stages.
    assert_eq!(
        harness.clock.sleeps(),
        ms(&[2000, 1000, 2000, 1000, 2000, 1000, 2000, 1000, 2000])
    );

    let publish = harness
        .backend
        .calls()
        .into_iter()
        .find_map(|call| match call {
            BackendCall::Publish(request) => Some(request),
            _ => None,
        })
        .unwrap();
    assert_eq!(publish.video_path, "/video/202.mp4");
    assert_eq!(publish.title, None);

    let StageParams::Publish(form) = harness.coordinator.params(StageId::Publish) else {
        panic!("wrong variant");
    };
    assert_eq!(form.video_resource_id, Some(202));
    assert_eq!(
        form.video_url.as_deref(),
        Some("https://cdn.test/video/202.mp4")
    );

    let types = harness.events.event_types();
    assert_eq!(types.first().map(String::as_str), Some(events::TASK_SUBMITTED));
    assert_eq!(types.last().map(String::as_str), Some(events::RUN_FINISHED));
    assert_eq!(harness.events.events_of_type(events::MODE_CHANGED).len(), 2);
    assert_eq!(harness.events.events_of_type(events::STEP_SUCCEEDED).len(), 5);
}

#[tokio::test]
async fn stop_lets_the_active_stage_finish_and_dispatches_nothing_else() {
    let harness = Harness::new();
    harness.fill_user_inputs();
    harness.backend.script_after_pending(
        StageId::RewriteScript,
        2,
        Ok(ScriptedBackend::default_success(StageId::RewriteScript)),
    );

    let mut rx = harness.coordinator.watch_steps();
    let stopper = async {
        rx.wait_for(|steps| steps[1].status == StepStatus::Running)
            .await
            .unwrap();
        assert!(harness.coordinator.stop());
    };
    let (result, ()) = tokio::join!(
        harness.coordinator.run_auto(AutoMode::ToPublish),
        stopper
    );

    let report = result.unwrap();
    assert!(report.stopped);
    assert_eq!(
        report.completed,
        vec![StageId::ParseLink, StageId::RewriteScript]
    );
    assert_eq!(
        harness.backend.kickoffs(),
        vec![StageId::ParseLink, StageId::RewriteScript]
    );
    assert_eq!(
        harness.coordinator.step(StageId::RewriteScript).status,
        StepStatus::Success
    );
    assert_eq!(
        harness.coordinator.step(StageId::SynthesizeVoice).status,
        StepStatus::Pending
    );
    assert_eq!(harness.coordinator.mode(), ExecutionMode::Manual);
    assert!(!harness.coordinator.stop());
}

#[tokio::test]
async fn cancel_discards_the_active_poll() {
    let harness = Harness::new();
    harness.fill_user_inputs();
    harness.backend.script(
        StageId::SynthesizeVideo,
        vec![Ok(CheckResponse::status(
            castflow::backend::RemoteStatus::Running,
        ))],
    );

    let mut rx = harness.coordinator.watch_steps();
    let canceller = async {
        rx.wait_for(|steps| steps[3].status == StepStatus::Running)
            .await
            .unwrap();
        assert!(harness.coordinator.cancel("user abort"));
    };
    let (result, ()) = tokio::join!(
        harness.coordinator.run_auto(AutoMode::ToPublish),
        canceller
    );

    match result.unwrap_err() {
        CastflowError::Cancelled { stage, reason } => {
            assert_eq!(stage, StageId::SynthesizeVideo);
            assert_eq!(reason, "user abort");
        }
        other => panic!("expected cancellation, got {other:?}"),
    }
    let video = harness.coordinator.step(StageId::SynthesizeVideo);
    assert_eq!(video.status, StepStatus::Error);
    assert_eq!(video.error.as_deref(), Some("canceled: user abort"));
    let task = harness.coordinator.main_task().unwrap();
    let statuses: Vec<_> = task.sub_tasks().iter().map(|s| s.status).collect();
    assert_eq!(
        statuses,
        vec![
            SubTaskStatus::Success,
            SubTaskStatus::Success,
            SubTaskStatus::Success,
            SubTaskStatus::Canceled,
            SubTaskStatus::Pending,
        ]
    );
    assert!(!harness.backend.kickoffs().contains(&StageId::Publish));
    assert!(!harness.coordinator.cancel("again"));
    assert!(!harness.coordinator.is_busy());
}

#[tokio::test]
async fn transient_poll_errors_back_off_and_are_reported() {
    let harness = Harness::new();
    harness.fill(StageId::SynthesizeVoice);
    harness.coordinator.select_stage(StageId::SynthesizeVoice);
    harness.backend.script(
        StageId::SynthesizeVoice,
        vec![
            Err("connection reset".to_string()),
            Err("connection reset".to_string()),
            Ok(CheckResponse::status(castflow::backend::RemoteStatus::Running)),
            Ok(ScriptedBackend::default_success(StageId::SynthesizeVoice)),
        ],
    );

    harness.coordinator.run_single_step().await.unwrap();

    assert_eq!(harness.backend.check_count(StageId::SynthesizeVoice), 4);
    assert_eq!(harness.clock.sleeps(), ms(&[2000, 3000, 4500, 4500]));
    let errors = harness.events.events_of_type(events::POLL_ERROR);
    assert_eq!(errors.len(), 2);
    assert_eq!(
        errors[1].1.as_ref().unwrap()["consecutive_errors"],
        serde_json::json!(2)
    );
}

#[tokio::test]
async fn poll_error_ceiling_fails_the_stage() {
    let config = CoordinatorConfig::default()
        .with_polling(PollConfig::default().with_max_consecutive_errors(3));
    let harness = Harness::with_config(config);
    harness.fill_user_inputs();
    harness
        .backend
        .script(StageId::RewriteScript, vec![Err("backend down".to_string())]);

    let err = harness
        .coordinator
        .run_auto(AutoMode::ToSynthesis)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        CastflowError::Poll(PollError::TooManyErrors { errors: 3, .. })
    ));
    assert_eq!(
        harness.coordinator.step(StageId::ParseLink).status,
        StepStatus::Success
    );
    let rewrite = harness.coordinator.step(StageId::RewriteScript);
    assert_eq!(rewrite.status, StepStatus::Error);
    assert!(rewrite.error.unwrap().contains("backend down"));
    assert_eq!(
        harness.backend.kickoffs(),
        vec![StageId::ParseLink, StageId::RewriteScript]
    );
}

async fn rewrite_content_after_run(policy: PropagationPolicy) -> (String, String) {
    let harness = Harness::with_config(CoordinatorConfig::default().with_policy(policy));
    harness.fill_user_inputs();
    harness.coordinator.edit_params(StageId::RewriteScript, |params| {
        if let StageParams::RewriteScript(p) = params {
            p.content = "my own script".to_string();
        }
    });
    harness
        .backend
        .script(StageId::ParseLink, vec![Ok(CheckResponse::success("parsed", None))]);

    harness
        .coordinator
        .run_auto(AutoMode::ToSynthesis)
        .await
        .unwrap();

    let sent = harness
        .backend
        .calls()
        .into_iter()
        .find_map(|call| match call {
            BackendCall::Rewrite(request) => Some(request.content),
            _ => None,
        })
        .unwrap();
    let form = harness
        .coordinator
        .params(StageId::RewriteScript)
        .field_value("content")
        .and_then(|v| v.as_str().map(ToString::to_string))
        .unwrap();
    (sent, form)
}

#[tokio::test]
async fn propagation_policy_decides_over_user_edits() {
    assert_eq!(
        rewrite_content_after_run(PropagationPolicy::PreserveUserEdits).await,
        ("my own script".to_string(), "my own script".to_string())
    );
    assert_eq!(
        rewrite_content_after_run(PropagationPolicy::AlwaysOverwrite).await,
        ("parsed".to_string(), "parsed".to_string())
    );
}

#[tokio::test]
async fn resuming_after_failure_submits_a_new_main_task() {
    let harness = Harness::new();
    harness.fill_user_inputs();
    harness.backend.script(
        StageId::SynthesizeVoice,
        vec![Ok(CheckResponse::failed("资源不存在"))],
    );
    assert!(harness
        .coordinator
        .run_auto(AutoMode::ToSynthesis)
        .await
        .is_err());
    let first_task = harness.coordinator.main_task().unwrap();
    assert_eq!(
        first_task.sub_task(StageId::SynthesizeVoice).unwrap().status,
        SubTaskStatus::Failed
    );
    assert_eq!(
        first_task.sub_task(StageId::SynthesizeVideo).unwrap().status,
        SubTaskStatus::Pending
    );

    harness.backend.script(
        StageId::SynthesizeVoice,
        vec![Ok(ScriptedBackend::default_success(StageId::SynthesizeVoice))],
    );
    harness.coordinator.select_stage(StageId::SynthesizeVoice);
    assert!(harness.coordinator.reset(StageId::SynthesizeVoice));
    let report = harness
        .coordinator
        .run_auto(AutoMode::ToSynthesis)
        .await
        .unwrap();

    assert_ne!(report.main_task_id, first_task.id);
    let creates = harness.backend.create_requests();
    assert_eq!(creates.len(), 2);
    assert_eq!(creates[1].start_step, 2);
    assert_eq!(creates[1].stage_defs().unwrap().len(), 2);

    let steps = harness.coordinator.steps();
    assert!(steps[..4].iter().all(|s| s.status == StepStatus::Success));
    assert!(steps[2].error.is_none());
}

#[tokio::test]
async fn failed_stage_must_be_reset_before_it_runs_again() {
    let harness = Harness::new();
    harness.fill(StageId::ParseLink);
    harness
        .backend
        .script(StageId::ParseLink, vec![Ok(CheckResponse::failed("链接无效"))]);
    assert!(harness.coordinator.run_single_step().await.is_err());
    let calls_after_failure = harness.backend.calls().len();

    let err = harness.coordinator.run_single_step().await.unwrap_err();
    match err {
        CastflowError::Precondition(err) => assert_eq!(err.stage, StageId::ParseLink),
        other => panic!("expected precondition error, got {other:?}"),
    }
    assert_eq!(harness.backend.calls().len(), calls_after_failure);
    let step = harness.coordinator.step(StageId::ParseLink);
    assert_eq!(step.status, StepStatus::Error);
    assert_eq!(step.error.as_deref(), Some("链接无效"));
    assert!(harness.events.events_of_type(events::STEP_RESET).is_empty());

    harness.backend.script(
        StageId::ParseLink,
        vec![Ok(ScriptedBackend::default_success(StageId::ParseLink))],
    );
    assert!(harness.coordinator.reset(StageId::ParseLink));
    harness.coordinator.run_single_step().await.unwrap();
    assert_eq!(harness.events.events_of_type(events::STEP_RESET).len(), 1);
    assert_eq!(
        harness.coordinator.step(StageId::ParseLink).status,
        StepStatus::Success
    );
}

#[tokio::test]
async fn failed_downstream_stage_blocks_an_automatic_run() {
    let harness = Harness::new();
    harness.fill_user_inputs();
    harness.backend.script(
        StageId::SynthesizeVideo,
        vec![Ok(CheckResponse::failed("合成失败"))],
    );
    assert!(harness
        .coordinator
        .run_auto(AutoMode::ToSynthesis)
        .await
        .is_err());

    let err = harness
        .coordinator
        .run_auto(AutoMode::ToSynthesis)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        CastflowError::Precondition(ref e) if e.stage == StageId::SynthesizeVideo
    ));
    assert_eq!(harness.backend.create_requests().len(), 1);
}

#[tokio::test]
async fn refresh_polls_the_active_stage_immediately() {
    let harness = Harness::new();
    harness.fill(StageId::ParseLink);
    harness.backend.script(
        StageId::ParseLink,
        vec![
            Err("connection reset".to_string()),
            Ok(ScriptedBackend::default_success(StageId::ParseLink)),
        ],
    );
    assert!(!harness.coordinator.refresh());

    let mut rx = harness.coordinator.watch_steps();
    let refresher = async {
        rx.wait_for(|steps| steps[0].status == StepStatus::Running)
            .await
            .unwrap();
        assert!(harness.coordinator.refresh());
    };
    let (result, ()) = tokio::join!(harness.coordinator.run_single_step(), refresher);

    result.unwrap();
    assert_eq!(harness.backend.check_count(StageId::ParseLink), 2);
    // The failed forced poll counts as an error but keeps the interval.
    assert_eq!(harness.clock.sleeps(), ms(&[2000, 2000]));
    let errors = harness.events.events_of_type(events::POLL_ERROR);
    assert_eq!(errors.len(), 1);
    assert_eq!(
        errors[0].1.as_ref().unwrap()["consecutive_errors"],
        serde_json::json!(1)
    );
    assert!(!harness.coordinator.refresh());
}

#[tokio::test]
async fn reset_all_restores_the_initial_workflow() {
    let harness = Harness::new();
    harness.fill(StageId::ParseLink);
    harness.coordinator.select_stage(StageId::ParseLink);
    harness.coordinator.run_single_step().await.unwrap();

    harness.coordinator.reset_all().unwrap();
    assert!(harness
        .coordinator
        .steps()
        .iter()
        .all(|s| s.status == StepStatus::Pending && s.result.is_none()));
    assert_eq!(
        harness.coordinator.params(StageId::ParseLink),
        StageParams::default_for(StageId::ParseLink)
    );
    assert!(harness.coordinator.main_task().is_none());
}

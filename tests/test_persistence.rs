//! File-backed checkpoints and reasoning memory across orchestrator
//! instances, as seen by separate CLI invocations.

mod test_support;

use std::sync::Arc;

use camino::Utf8PathBuf;
use fabula_checkpoint::{CheckpointStore, FileCheckpointStore};
use fabula_memory::{FileReasoningMemory, QUALITY_THRESHOLD, ReasoningMemory};
use fabula_utils::paths::FabulaHome;
use fabula_utils::types::{JobId, JobStatus, PhaseId};
use tempfile::TempDir;

use test_support::{Harness, TEXT_PHASES, clean_output, job_id, strong_reasoning};

fn temp_home() -> (TempDir, FabulaHome) {
    let temp = TempDir::new().unwrap();
    let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
    (temp, FabulaHome::new(root))
}

#[tokio::test]
async fn test_checkpoint_survives_a_new_orchestrator() {
    let (_temp, home) = temp_home();

    let first = Harness::builder()
        .store(Arc::new(FileCheckpointStore::new(home.clone())))
        .build();
    first.script_clean_run();
    let result = first.handle.start_or_resume(first.alpha_spec()).await.unwrap();
    assert_eq!(result.status, JobStatus::Completed);
    assert!(home.job_file(&job_id("alpha")).exists());
    drop(first);

    // A fresh process with an empty script: any gateway call would fail.
    let second = Harness::builder()
        .store(Arc::new(FileCheckpointStore::new(home.clone())))
        .build();
    let again = second.handle.start_or_resume(second.alpha_spec()).await.unwrap();

    assert_eq!(again.status, JobStatus::Completed);
    assert_eq!(second.text.call_count(), 0);
    assert_eq!(again.total_tokens, result.total_tokens);
}

#[tokio::test]
async fn test_file_lock_released_after_run() {
    let (_temp, home) = temp_home();
    let store = Arc::new(FileCheckpointStore::new(home.clone()));
    let harness = Harness::builder().store(store.clone()).build();
    harness.script_clean_run();

    harness.handle.start_or_resume(harness.alpha_spec()).await.unwrap();

    // The run's guard is gone, so the lock can be taken again.
    let guard = store.lock_job(&job_id("alpha")).unwrap();
    assert_eq!(guard.job_id().as_str(), "alpha");
}

#[tokio::test]
async fn test_strong_reasoning_is_remembered_and_reused() {
    let (_temp, home) = temp_home();
    let memory = Arc::new(FileReasoningMemory::new(home.memory_dir()));

    let first = Harness::builder().memory(memory.clone()).build();
    for phase in TEXT_PHASES {
        first
            .text
            .push_ok_with_reasoning(phase, clean_output(phase), strong_reasoning(phase.as_str()));
    }
    first.handle.start_or_resume(first.alpha_spec()).await.unwrap();

    let stored = memory.list(PhaseId::CharacterProfiles).unwrap();
    assert_eq!(stored.len(), 1);
    assert!(stored[0].quality_score >= QUALITY_THRESHOLD);

    // A second job gets the trace injected into its prompt.
    let second = Harness::builder().memory(memory.clone()).build();
    second.script_clean_run();
    let spec = fabula_engine::JobSpec::new(JobId::parse("beta").unwrap(), "Another story.");
    second.handle.start_or_resume(spec).await.unwrap();

    let call = second
        .text
        .invocations()
        .into_iter()
        .find(|inv| inv.phase == PhaseId::CharacterProfiles)
        .unwrap();
    assert!(
        call.messages
            .iter()
            .any(|m| m.content.contains("# Reference reasoning"))
    );
    let reused = memory.list(PhaseId::CharacterProfiles).unwrap();
    assert_eq!(reused[0].usage_count, 1);
}

#[tokio::test]
async fn test_weak_reasoning_is_not_remembered() {
    let (_temp, home) = temp_home();
    let memory = Arc::new(FileReasoningMemory::new(home.memory_dir()));
    let harness = Harness::builder().memory(memory.clone()).build();
    for phase in TEXT_PHASES {
        harness
            .text
            .push_ok_with_reasoning(phase, clean_output(phase), "Looks like a drama.");
    }

    harness.handle.start_or_resume(harness.alpha_spec()).await.unwrap();

    for phase in TEXT_PHASES {
        assert!(memory.list(phase).unwrap().is_empty());
    }
}

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared harness for the end-to-end specs.

use cvr_adapters::{
    BuilderConfig, BuilderLimits, BuilderRegistry, BuilderTimeouts, FakeBuilderAdapter,
    SessionPool,
};
use cvr_core::task::TaskStatus;
use cvr_core::SystemClock;
use cvr_daemon::Orchestrator;
use cvr_prompts::PromptWorkspace;
use cvr_storage::{CoreState, EventLog};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

pub(crate) struct Core {
    pub orchestrator: Orchestrator,
    pub pool: Arc<cvr_daemon::DaemonPool>,
    pub fake: FakeBuilderAdapter,
    pub log: EventLog,
}

fn builder_config() -> BuilderConfig {
    BuilderConfig {
        name: "default-builder".into(),
        kind: "default".into(),
        endpoint: "127.0.0.1:9900".into(),
        default_model: None,
        auth_token: None,
        timeouts: BuilderTimeouts {
            create_s: 5,
            send_s: 5,
            stream_idle_s: 60,
            abort_confirm_s: 2,
        },
        limits: BuilderLimits { max_sessions: 4, max_reconnects: 2, reconnect_window_s: 60 },
    }
}

impl Core {
    /// Open (or reopen) the core rooted at `root`, replaying any persisted
    /// log. Reopening the same root is the crash-recovery path.
    pub fn open(root: &Path) -> Self {
        let log =
            EventLog::open(&root.join("state/events.wal"), CoreState::default()).unwrap();

        let fake = FakeBuilderAdapter::new();
        let mut registry = BuilderRegistry::new();
        registry.register(builder_config(), Arc::new(fake.clone()));

        let (event_tx, mut event_rx) = mpsc::channel(64);
        let pool: Arc<cvr_daemon::DaemonPool> =
            Arc::new(SessionPool::new(registry, event_tx, SystemClock));
        {
            let log = log.clone();
            tokio::spawn(async move {
                while let Some(proposed) = event_rx.recv().await {
                    let _ = log.append(proposed);
                }
            });
        }

        let prompts = Arc::new(PromptWorkspace::new(root.join("prompts")));
        let orchestrator = Orchestrator::new(log.clone(), prompts, Arc::clone(&pool));
        Self { orchestrator, pool, fake, log }
    }

    /// Refine a fresh task through questions to `ready_to_handoff`
    /// (spec scenario: vague request to handoff). Returns the task id.
    pub async fn refined_task(&self) -> String {
        let (task_id, _) = self
            .orchestrator
            .create_task("JWT refresh fix", Some("normal"), None)
            .unwrap();
        self.orchestrator
            .update_working_prompt(
                task_id.as_str(),
                "initial capture",
                "# JWT refresh fix\nfails after 15m idle",
                None,
            )
            .await
            .unwrap();
        self.orchestrator
            .raise_questions(
                task_id.as_str(),
                vec!["auto-refresh?".into(), "idle cap?".into()],
                None,
            )
            .unwrap();
        self.orchestrator
            .answer_questions(
                task_id.as_str(),
                serde_json::json!({"auto_refresh": true, "idle_cap_min": 30}),
                None,
            )
            .unwrap();
        self.orchestrator
            .freeze_prompt(task_id.as_str(), None, None)
            .await
            .unwrap();
        task_id.as_str().to_string()
    }

    /// Dispatch a refined task and walk it to `running`. Returns
    /// (task_id, session_id).
    pub async fn running_task(&self) -> (String, String) {
        let task_id = self.refined_task().await;
        let outcome = self
            .orchestrator
            .dispatch(&task_id, "default", None)
            .await
            .unwrap();
        self.wait_status(&task_id, TaskStatus::HandedOff).await;
        self.fake.push_event(
            outcome.session_id.as_str(),
            cvr_adapters::RemoteEvent::Status { status: "running".into(), reason: None },
        );
        self.wait_status(&task_id, TaskStatus::Running).await;
        (task_id, outcome.session_id.as_str().to_string())
    }

    pub fn status_of(&self, task_id: &str) -> Option<TaskStatus> {
        self.log.with_state(|s| s.find_task(task_id).map(|t| t.status))
    }

    /// Wait for asynchronously flowing events to land a task in `status`.
    pub async fn wait_status(&self, task_id: &str, status: TaskStatus) {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
        loop {
            if self.status_of(task_id) == Some(status) {
                return;
            }
            if tokio::time::Instant::now() > deadline {
                panic!(
                    "task {} never reached {:?}, at {:?}",
                    task_id,
                    status,
                    self.status_of(task_id)
                );
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    /// Event type strings from the log after `from_seq`, in order.
    pub async fn event_types_after(&self, from_seq: u64, count: usize) -> Vec<String> {
        let mut sub = self.log.subscribe(from_seq);
        let mut out = Vec::new();
        for _ in 0..count {
            let event = tokio::time::timeout(Duration::from_secs(2), sub.recv())
                .await
                .expect("timed out waiting for event");
            out.push(event.body.type_str().to_string());
        }
        out
    }
}

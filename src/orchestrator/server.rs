//! Server lifecycle.
//!
//! Delete is the long one: stop, wait, detach every non-basic disk and wait
//! for each, terminate, then wait for the server to disappear. A terminate
//! error is tolerated only when a fresh read shows the server already going.

use super::{OperationResult, Orchestrator};
use crate::backend::{LogicalOperation, OperationKind, Placement};
use crate::types::{ServerChange, ServerSpec};
use converge::status::{CREAT, DETAC, INIT, NSTOP, RUN, TERMT};
use converge::{
    ABSENT, ConvergenceTarget, Error, LifecycleState, Operation, OperationReport, ResourceKind,
    Result, Step, StepOutcome, await_state,
};

impl Orchestrator<'_> {
    /// Create a server and wait until it runs.
    pub fn create_server(&self, spec: &ServerSpec) -> OperationResult {
        let mut report =
            OperationReport::new(Operation::Create, ResourceKind::Server, LifecycleState::Absent);
        let result = self.create_server_steps(spec, &mut report);
        report.finish(result)
    }

    /// Read a server once. An absent server is not an error.
    pub fn read_server(&self, id: &str) -> OperationResult {
        let mut report =
            OperationReport::new(Operation::Read, ResourceKind::Server, LifecycleState::Active);
        report.identify(id);
        let dispatcher = self.session.dispatcher();
        let policy = &self.session.policies().server_busy;
        let found = report.run_with(
            Step::Read,
            || self.retry(policy, || dispatcher.get_server(id)),
            |found| match found {
                Some(_) => StepOutcome::Completed,
                None => StepOutcome::AlreadyDone,
            },
        );
        match found {
            Ok(Some(handle)) => report.observe(handle),
            // an observation, not a lifecycle transition
            Ok(None) => report.state = LifecycleState::Absent,
            Err(e) => return Err(report.fail(e)),
        }
        Ok(report)
    }

    /// Apply a spec change and/or a termination-protection change.
    pub fn update_server(&self, id: &str, change: &ServerChange) -> OperationResult {
        let mut report =
            OperationReport::new(Operation::Update, ResourceKind::Server, LifecycleState::Active);
        report.identify(id);
        let result = self.update_server_steps(id, change, &mut report);
        report.finish(result)
    }

    /// Stop, detach additional storage, terminate and wait for the server to go.
    pub fn delete_server(&self, id: &str) -> OperationResult {
        let mut report =
            OperationReport::new(Operation::Delete, ResourceKind::Server, LifecycleState::Active);
        report.identify(id);
        let result = self.delete_server_steps(id, &mut report);
        report.finish(result)
    }

    fn require_protection_support(&self) -> Result<()> {
        let dispatcher = self.session.dispatcher();
        let kind = OperationKind::SetTerminationProtection;
        if dispatcher.supports(kind) {
            Ok(())
        } else {
            Err(Error::unsupported(kind.as_str(), dispatcher.variant()))
        }
    }

    fn create_server_steps(&self, spec: &ServerSpec, report: &mut OperationReport) -> Result<()> {
        let session = self.session;
        let dispatcher = session.dispatcher();
        let policies = session.policies();

        if spec.protect_termination {
            self.require_protection_support()?;
        }
        // validation looks at the server spec only; placement is resolved below
        dispatcher.check(&LogicalOperation::CreateServer {
            spec: spec.clone(),
            placement: Placement::default(),
        })?;

        let placement = report.run(Step::Resolve, || session.placement(spec.zone.as_deref()))?;

        report.advance(LifecycleState::Creating);
        let handle = report.run(Step::Create, || {
            self.retry(&policies.create_contention, || {
                dispatcher.create_server(spec, &placement)
            })
        })?;
        let id = handle.id.clone();
        report.observe(handle);

        let target = session.target(
            ConvergenceTarget::reach([RUN]).pending([INIT, CREAT]),
            session.config().timeouts.create(),
        );
        self.await_step(report, Step::AwaitActive, ResourceKind::Server, &id, &target, || {
            dispatcher.get_server(&id)
        })?;

        if spec.protect_termination {
            report.run(Step::SetProtection, || {
                self.retry(&policies.server_busy, || {
                    dispatcher.set_termination_protection(&id, true)
                })
            })?;
        }

        report.advance(LifecycleState::Active);
        Ok(())
    }

    fn update_server_steps(
        &self,
        id: &str,
        change: &ServerChange,
        report: &mut OperationReport,
    ) -> Result<()> {
        let session = self.session;
        let dispatcher = session.dispatcher();
        let policies = session.policies();

        if change.protect_termination.is_some() {
            self.require_protection_support()?;
        }

        let current = report.run(Step::Read, || {
            self.retry(&policies.server_busy, || dispatcher.get_server(id))?
                .ok_or_else(|| Error::UnexpectedAbsence {
                    kind: ResourceKind::Server,
                    id: id.to_string(),
                    target: "present".into(),
                })
        })?;
        let status = current.status_code.clone();
        report.observe(current);
        report.advance(LifecycleState::Updating);

        match change.product_code.as_deref() {
            Some(product_code) => {
                report.run(Step::ChangeConfiguration, || {
                    self.retry(&policies.server_busy, || {
                        dispatcher.change_server_spec(id, product_code)
                    })
                })?;
                let target = session.target(
                    ConvergenceTarget::reach([status]).require_idle(),
                    session.config().timeouts.update(),
                );
                self.await_step(report, Step::AwaitStable, ResourceKind::Server, id, &target, || {
                    dispatcher.get_server(id)
                })?;
            }
            None => report.record(
                Step::ChangeConfiguration,
                StepOutcome::Skipped {
                    reason: "no product change requested".into(),
                },
            ),
        }

        if let Some(protect) = change.protect_termination {
            report.run(Step::SetProtection, || {
                self.retry(&policies.server_busy, || {
                    dispatcher.set_termination_protection(id, protect)
                })
            })?;
        }

        report.advance(LifecycleState::Active);
        Ok(())
    }

    fn delete_server_steps(&self, id: &str, report: &mut OperationReport) -> Result<()> {
        let session = self.session;
        let dispatcher = session.dispatcher();
        let policies = session.policies();
        let timeouts = &session.config().timeouts;

        let current = report.run_with(
            Step::Read,
            || self.retry(&policies.server_busy, || dispatcher.get_server(id)),
            |found| match found {
                Some(_) => StepOutcome::Completed,
                None => StepOutcome::AlreadyDone,
            },
        )?;
        report.advance(LifecycleState::Deleting);
        let Some(current) = current else {
            report.advance(LifecycleState::Absent);
            return Ok(());
        };
        let status = current.status_code.clone();
        report.observe(current);

        if status == TERMT {
            report.record(
                Step::Stop,
                StepOutcome::Skipped {
                    reason: "server is already terminating".into(),
                },
            );
            return self.await_server_gone(id, report);
        }

        if status == NSTOP {
            report.record(Step::Stop, StepOutcome::AlreadyDone);
        } else {
            report.run(Step::Stop, || {
                self.retry(&policies.server_busy, || dispatcher.stop_server(id))
            })?;
            let target = session.target(ConvergenceTarget::reach([NSTOP]), timeouts.stop());
            self.await_step(report, Step::AwaitStopped, ResourceKind::Server, id, &target, || {
                dispatcher.get_server(id)
            })?;
        }

        let storages = report.run(Step::ListAttachments, || dispatcher.list_block_storage(id))?;
        for storage in storages.iter().filter(|s| s.needs_detach()) {
            let storage_id = storage.handle.id.as_str();
            if storage.handle.has_status(DETAC) {
                report.record(
                    Step::Detach {
                        storage_id: storage_id.to_string(),
                    },
                    StepOutcome::AlreadyDone,
                );
                continue;
            }
            report.run(
                Step::Detach {
                    storage_id: storage_id.to_string(),
                },
                || {
                    self.retry(&policies.detach_in_progress, || {
                        dispatcher.detach_block_storage(storage_id)
                    })
                },
            )?;
            let target =
                session.target(ConvergenceTarget::reach([DETAC, ABSENT]), timeouts.delete());
            self.await_step(
                report,
                Step::AwaitDetached {
                    storage_id: storage_id.to_string(),
                },
                ResourceKind::BlockStorage,
                storage_id,
                &target,
                || dispatcher.get_block_storage(storage_id),
            )?;
        }

        log::info!("server {id}: terminating");
        let terminated = self.retry(&policies.create_contention, || {
            dispatcher.terminate_server(id)
        });
        if let Err(err) = terminated {
            let check = dispatcher.get_server(id);
            let going = match &check {
                Ok(None) => true,
                Ok(Some(handle)) => handle.has_status(TERMT),
                Err(_) => false,
            };
            let error = err.to_string();
            if going {
                report.record(Step::Terminate, StepOutcome::Tolerated { error });
                report.record(Step::VerifyGone, StepOutcome::Completed);
            } else {
                report.record(Step::Terminate, StepOutcome::Failed { error });
                let verify = match check {
                    Ok(_) => StepOutcome::Completed,
                    Err(e) => StepOutcome::Failed {
                        error: e.to_string(),
                    },
                };
                report.record(Step::VerifyGone, verify);
                return Err(err);
            }
        } else {
            report.record(Step::Terminate, StepOutcome::Completed);
        }

        self.await_server_gone(id, report)
    }

    /// Wait for the server to disappear. Running out of time is tolerated:
    /// termination was accepted and finishes on the provider side.
    fn await_server_gone(&self, id: &str, report: &mut OperationReport) -> Result<()> {
        let session = self.session;
        let dispatcher = session.dispatcher();
        let target = session.target(ConvergenceTarget::gone(), session.config().timeouts.delete());
        let clock = session.clock();

        match await_state(clock, ResourceKind::Server, id, &target, || dispatcher.get_server(id)) {
            Ok(_) => report.record(Step::AwaitGone, StepOutcome::Completed),
            Err(e) if e.is_timeout() => report.record(
                Step::AwaitGone,
                StepOutcome::Tolerated {
                    error: e.to_string(),
                },
            ),
            Err(e) => {
                report.record(
                    Step::AwaitGone,
                    StepOutcome::Failed {
                        error: e.to_string(),
                    },
                );
                return Err(e);
            }
        }

        report.handle = None;
        report.advance(LifecycleState::Absent);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::{no_servers, ok, server, session};
    use super::*;
    use apiclient::MockTransport;
    use converge::BackendVariant;
    use serde_json::json;
    use std::time::Duration;

    fn script_nextgen_regions(mock: &MockTransport) {
        mock.respond(
            "getRegionList",
            json!({
                "returnCode": "0",
                "regionList": [{ "regionCode": "KR", "regionName": "Korea" }]
            }),
        );
        mock.respond(
            "getZoneList",
            json!({
                "returnCode": "0",
                "zoneList": [{ "zoneCode": "KR-2", "zoneName": "KR-2" }]
            }),
        );
    }

    fn vpc_spec() -> ServerSpec {
        let mut spec = ServerSpec::new("SW.VSVR.OS.LNX64.UBNTU.SVR2004.B050");
        spec.subnet_id = Some("4410".into());
        spec.zone = Some("KR-2".into());
        spec
    }

    #[test]
    fn test_create_waits_for_run() {
        let (mock, clock, session) = session(BackendVariant::NextGen);
        script_nextgen_regions(&mock);
        mock.respond("createServerInstances", server("901", "INIT", "NULL"));
        mock.respond("getServerInstanceDetail", server("901", "CREAT", "NULL"))
            .respond("getServerInstanceDetail", server("901", "CREAT", "NULL"))
            .respond("getServerInstanceDetail", server("901", "RUN", "NULL"));
        mock.respond("setProtectServerTermination", ok());

        let mut spec = vpc_spec();
        spec.protect_termination = true;
        let report = session.orchestrator().create_server(&spec).unwrap();

        assert_eq!(report.state, LifecycleState::Active);
        assert_eq!(report.resource_id.as_deref(), Some("901"));
        assert_eq!(report.handle.as_ref().unwrap().status_code, "RUN");
        assert_eq!(
            report.step_names(),
            ["resolve", "create", "await active", "set protection"]
        );
        assert_eq!(mock.call_count("getServerInstanceDetail"), 3);
        assert_eq!(clock.total_slept(), Duration::from_secs(2));
    }

    #[test]
    fn test_create_retries_contention() {
        let (mock, clock, session) = session(BackendVariant::NextGen);
        script_nextgen_regions(&mock);
        mock.fail(
            "createServerInstances",
            "23006",
            "Previous servers have not been entirely terminated.",
        )
        .respond("createServerInstances", server("902", "INIT", "NULL"));
        mock.respond("getServerInstanceDetail", server("902", "RUN", "NULL"));

        let report = session.orchestrator().create_server(&vpc_spec()).unwrap();
        assert_eq!(report.state, LifecycleState::Active);
        assert_eq!(mock.call_count("createServerInstances"), 2);
        assert_eq!(clock.sleeps(), [Duration::from_secs(2)]);
    }

    #[test]
    fn test_protection_on_legacy_fails_before_any_call() {
        let (mock, _, session) = session(BackendVariant::Legacy);
        let mut spec = ServerSpec::new("SPSW0LINUX000046");
        spec.protect_termination = true;

        let err = session.orchestrator().create_server(&spec).unwrap_err();
        assert!(matches!(err.source, Error::UnsupportedOnVariant { .. }));
        assert_eq!(err.report.state, LifecycleState::Absent);
        assert!(err.report.steps.is_empty());
        assert!(mock.calls().is_empty());
    }

    #[test]
    fn test_invalid_create_makes_no_calls() {
        let (mock, _, session) = session(BackendVariant::NextGen);
        let err = session
            .orchestrator()
            .create_server(&ServerSpec::new("SW.VSVR.OS.LNX64.UBNTU.SVR2004.B050"))
            .unwrap_err();
        assert!(matches!(err.source, Error::InvalidRequest { .. }));
        assert!(mock.calls().is_empty());
    }

    #[test]
    fn test_read_absent_server() {
        let (mock, _, session) = session(BackendVariant::Legacy);
        mock.respond("getServerInstanceList", no_servers());
        let report = session.orchestrator().read_server("12345").unwrap();
        assert_eq!(report.state, LifecycleState::Absent);
        assert_eq!(report.outcome_of(&Step::Read), Some(&StepOutcome::AlreadyDone));
        assert!(report.handle.is_none());
    }

    #[test]
    fn test_update_waits_for_idle() {
        let (mock, _, session) = session(BackendVariant::NextGen);
        mock.respond("getServerInstanceDetail", server("12345", "NSTOP", "NULL"))
            .respond("getServerInstanceDetail", server("12345", "NSTOP", "CHNG"))
            .respond("getServerInstanceDetail", server("12345", "NSTOP", "NULL"));
        mock.respond("changeServerInstanceSpec", ok());

        let change = ServerChange {
            product_code: Some("SVR.VSVR.STAND.C004.M016.NET.SSD.B050.G002".into()),
            protect_termination: None,
        };
        let report = session.orchestrator().update_server("12345", &change).unwrap();
        assert_eq!(report.state, LifecycleState::Active);
        assert_eq!(report.step_names(), ["read", "change configuration", "await stable"]);
        assert_eq!(mock.call_count("getServerInstanceDetail"), 3);
    }

    #[test]
    fn test_update_without_changes_skips() {
        let (mock, _, session) = session(BackendVariant::Legacy);
        mock.respond("getServerInstanceList", server("12345", "RUN", "NULL"));
        let report = session
            .orchestrator()
            .update_server("12345", &ServerChange::default())
            .unwrap();
        assert!(matches!(
            report.outcome_of(&Step::ChangeConfiguration),
            Some(StepOutcome::Skipped { .. })
        ));
        assert_eq!(mock.calls().len(), 1);
    }

    #[test]
    fn test_delete_detaches_before_terminate() {
        let (mock, _, session) = session(BackendVariant::Legacy);
        mock.respond("getServerInstanceList", server("12345", "RUN", "NULL"))
            .respond("getServerInstanceList", server("12345", "NSTOP", "NULL"))
            .respond("getServerInstanceList", no_servers());
        mock.respond("stopServerInstances", ok());
        mock.respond(
            "getBlockStorageInstanceList",
            json!({
                "returnCode": "0",
                "blockStorageInstanceList": [
                    {
                        "blockStorageInstanceNo": "51",
                        "serverInstanceNo": "12345",
                        "blockStorageInstanceStatus": { "code": "ATTAC" },
                        "blockStorageType": { "code": "BASIC" }
                    },
                    {
                        "blockStorageInstanceNo": "52",
                        "serverInstanceNo": "12345",
                        "blockStorageInstanceStatus": { "code": "ATTAC" },
                        "blockStorageType": { "code": "SVRBS" }
                    }
                ]
            }),
        )
        .respond(
            "getBlockStorageInstanceList",
            json!({
                "returnCode": "0",
                "blockStorageInstanceList": [{
                    "blockStorageInstanceNo": "52",
                    "blockStorageInstanceStatus": { "code": "DETAC" },
                    "blockStorageType": { "code": "SVRBS" }
                }]
            }),
        );
        mock.respond("detachBlockStorageInstances", ok());
        mock.respond("terminateServerInstances", ok());

        let report = session.orchestrator().delete_server("12345").unwrap();
        assert_eq!(report.state, LifecycleState::Absent);
        assert!(report.handle.is_none());
        assert_eq!(
            report.step_names(),
            [
                "read",
                "stop",
                "await stopped",
                "list attachments",
                "detach 52",
                "await detached 52",
                "terminate",
                "await gone"
            ]
        );

        let actions = mock.actions();
        let detach = actions.iter().position(|a| a == "detachBlockStorageInstances").unwrap();
        let terminate = actions.iter().position(|a| a == "terminateServerInstances").unwrap();
        assert!(detach < terminate);
        assert_eq!(mock.call_count("detachBlockStorageInstances"), 1);
        let detach_call = &mock.calls()[detach];
        assert_eq!(detach_call.get("blockStorageInstanceNoList.1"), Some("52"));
    }

    #[test]
    fn test_nextgen_delete_waits_for_detach_before_terminate() {
        let (mock, _, session) = session(BackendVariant::NextGen);
        mock.respond("getServerInstanceDetail", server("12345", "RUN", "NULL"))
            .respond("getServerInstanceDetail", server("12345", "NSTOP", "NULL"))
            .fail("getServerInstanceDetail", "1200002", "Server instance not found.");
        mock.respond("stopServerInstances", ok());
        mock.respond(
            "getBlockStorageInstanceList",
            json!({
                "returnCode": "0",
                "blockStorageInstanceList": [
                    {
                        "blockStorageInstanceNo": "61",
                        "serverInstanceNo": "12345",
                        "blockStorageInstanceStatus": { "code": "ATTAC" },
                        "blockStorageTypeCode": "BASIC"
                    },
                    {
                        "blockStorageInstanceNo": "62",
                        "serverInstanceNo": "12345",
                        "blockStorageInstanceStatus": { "code": "ATTAC" },
                        "blockStorageTypeCode": "SVRBS"
                    }
                ]
            }),
        );
        mock.respond("detachBlockStorageInstances", ok());
        mock.respond(
            "getBlockStorageInstanceDetail",
            json!({
                "returnCode": "0",
                "blockStorageInstanceList": [{
                    "blockStorageInstanceNo": "62",
                    "blockStorageInstanceStatus": { "code": "ATTAC" },
                    "blockStorageTypeCode": "SVRBS"
                }]
            }),
        )
        .fail("getBlockStorageInstanceDetail", "1200002", "Block storage not found.");
        mock.respond("terminateServerInstances", ok());

        let report = session.orchestrator().delete_server("12345").unwrap();
        assert_eq!(report.state, LifecycleState::Absent);
        assert_eq!(
            report.step_names(),
            [
                "read",
                "stop",
                "await stopped",
                "list attachments",
                "detach 62",
                "await detached 62",
                "terminate",
                "await gone"
            ]
        );

        let actions = mock.actions();
        let position = |action: &str| actions.iter().position(|a| a == action).unwrap();
        let detach = position("detachBlockStorageInstances");
        let detail = position("getBlockStorageInstanceDetail");
        let terminate = position("terminateServerInstances");
        assert!(detach < detail);
        assert!(detail < terminate);
        assert_eq!(mock.call_count("getBlockStorageInstanceDetail"), 2);
        assert_eq!(mock.call_count("detachBlockStorageInstances"), 1);
        let detach_call = &mock.calls()[detach];
        assert_eq!(detach_call.get("blockStorageInstanceNoList.1"), Some("62"));
        assert_eq!(detach_call.get("blockStorageInstanceNoList.2"), None);
    }

    #[test]
    fn test_delete_absent_server_is_done() {
        let (mock, _, session) = session(BackendVariant::Legacy);
        mock.respond("getServerInstanceList", no_servers());
        let report = session.orchestrator().delete_server("12345").unwrap();
        assert_eq!(report.state, LifecycleState::Absent);
        assert_eq!(report.step_names(), ["read"]);
        assert_eq!(mock.calls().len(), 1);
    }

    #[test]
    fn test_terminate_error_tolerated_when_server_gone() {
        let (mock, _, session) = session(BackendVariant::NextGen);
        mock.respond("getServerInstanceDetail", server("12345", "NSTOP", "NULL"))
            .fail("getServerInstanceDetail", "1200002", "Server instance not found.");
        mock.respond(
            "getBlockStorageInstanceList",
            json!({
                "returnCode": "0",
                "blockStorageInstanceList": [{
                    "blockStorageInstanceNo": "61",
                    "serverInstanceNo": "12345",
                    "blockStorageInstanceStatus": { "code": "ATTAC" },
                    "blockStorageTypeCode": "BASIC"
                }]
            }),
        );
        mock.fail("terminateServerInstances", "10500", "Unable to terminate.");

        let report = session.orchestrator().delete_server("12345").unwrap();
        assert_eq!(report.state, LifecycleState::Absent);
        assert_eq!(report.outcome_of(&Step::Stop), Some(&StepOutcome::AlreadyDone));
        assert!(matches!(
            report.outcome_of(&Step::Terminate),
            Some(StepOutcome::Tolerated { .. })
        ));
        assert_eq!(report.outcome_of(&Step::VerifyGone), Some(&StepOutcome::Completed));
        assert_eq!(mock.call_count("detachBlockStorageInstances"), 0);
    }

    #[test]
    fn test_terminate_error_surfaces_when_server_remains() {
        let (mock, _, session) = session(BackendVariant::NextGen);
        mock.respond("getServerInstanceDetail", server("12345", "NSTOP", "NULL"));
        mock.respond(
            "getBlockStorageInstanceList",
            json!({ "returnCode": "0", "blockStorageInstanceList": [] }),
        );
        mock.fail("terminateServerInstances", "10500", "Unable to terminate.");

        let err = session.orchestrator().delete_server("12345").unwrap_err();
        assert_eq!(err.source.provider_code(), Some("10500"));
        assert_eq!(err.failed_step(), Some(&Step::Terminate));
        assert_eq!(err.report.state, LifecycleState::Deleting);
        assert_eq!(mock.call_count("getServerInstanceDetail"), 2);
    }

    #[test]
    fn test_await_gone_timeout_is_tolerated() {
        let (mock, clock, session) = session(BackendVariant::Legacy);
        mock.respond("getServerInstanceList", server("12345", "TERMT", "NULL"));

        let report = session.orchestrator().delete_server("12345").unwrap();
        assert_eq!(report.state, LifecycleState::Absent);
        assert!(matches!(report.outcome_of(&Step::Stop), Some(StepOutcome::Skipped { .. })));
        assert!(matches!(
            report.outcome_of(&Step::AwaitGone),
            Some(StepOutcome::Tolerated { .. })
        ));
        assert_eq!(clock.elapsed(), session.config().timeouts.delete());
        assert_eq!(mock.call_count("terminateServerInstances"), 0);
    }
}

//! Load balancer listener updates.

use super::{OperationResult, Orchestrator};
use crate::backend::LogicalOperation;
use crate::types::ListenerChange;
use converge::status::USED;
use converge::{
    ConvergenceTarget, Error, LifecycleState, Operation, OperationReport, ResourceKind, Result,
    Step,
};

impl Orchestrator<'_> {
    /// Change a listener and wait until the load balancer is idle again.
    pub fn update_listener(&self, change: &ListenerChange) -> OperationResult {
        let mut report = OperationReport::new(
            Operation::Update,
            ResourceKind::LoadBalancer,
            LifecycleState::Active,
        );
        report.identify(change.load_balancer_id.as_str());
        let result = self.update_listener_steps(change, &mut report);
        report.finish(result)
    }

    fn update_listener_steps(
        &self,
        change: &ListenerChange,
        report: &mut OperationReport,
    ) -> Result<()> {
        let session = self.session;
        let dispatcher = session.dispatcher();
        let policy = &session.policies().busy_object;
        let id = change.load_balancer_id.as_str();

        dispatcher.check(&LogicalOperation::ChangeListenerConfiguration(change.clone()))?;

        let current = report.run(Step::Read, || {
            self.retry(policy, || dispatcher.get_load_balancer(id))?
                .ok_or_else(|| Error::UnexpectedAbsence {
                    kind: ResourceKind::LoadBalancer,
                    id: id.to_string(),
                    target: "present".into(),
                })
        })?;
        report.observe(current);
        report.advance(LifecycleState::Updating);

        report.run(Step::ChangeConfiguration, || {
            self.retry(policy, || dispatcher.change_listener(change))
        })?;

        let target = session.target(
            ConvergenceTarget::reach([USED]).require_idle(),
            session.config().timeouts.update(),
        );
        self.await_step(report, Step::AwaitStable, ResourceKind::LoadBalancer, id, &target, || {
            dispatcher.get_load_balancer(id)
        })?;

        report.advance(LifecycleState::Active);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::{ok, session};
    use super::*;
    use converge::BackendVariant;
    use serde_json::{Value, json};
    use std::time::Duration;

    fn load_balancer(operation: &str) -> Value {
        json!({
            "returnCode": "0",
            "loadBalancerInstanceList": [{
                "loadBalancerInstanceNo": "700",
                "loadBalancerInstanceStatus": { "code": "USED" },
                "loadBalancerInstanceOperation": { "code": operation }
            }]
        })
    }

    fn change() -> ListenerChange {
        ListenerChange {
            load_balancer_id: "700".into(),
            listener_id: None,
            protocol: "HTTP".into(),
            port: 80,
            target_port: Some(8080),
            algorithm: None,
        }
    }

    #[test]
    fn test_busy_balancer_retried_after_fixed_delay() {
        let (mock, clock, session) = session(BackendVariant::Legacy);
        mock.respond("getLoadBalancerInstanceList", load_balancer("NULL"))
            .respond("getLoadBalancerInstanceList", load_balancer("CHANG"))
            .respond("getLoadBalancerInstanceList", load_balancer("NULL"));
        mock.fail(
            "changeLoadBalancerInstanceConfiguration",
            "1300",
            "Load balancer is in operation.",
        )
        .respond("changeLoadBalancerInstanceConfiguration", ok());

        let report = session.orchestrator().update_listener(&change()).unwrap();
        assert_eq!(report.state, LifecycleState::Active);
        assert_eq!(report.step_names(), ["read", "change configuration", "await stable"]);
        assert_eq!(clock.sleeps()[0], Duration::from_secs(5));
        assert_eq!(mock.call_count("changeLoadBalancerInstanceConfiguration"), 2);
        assert_eq!(report.handle.as_ref().unwrap().operation_code, "NULL");
    }

    #[test]
    fn test_invalid_change_makes_no_calls() {
        let (mock, _, session) = session(BackendVariant::NextGen);
        let err = session.orchestrator().update_listener(&change()).unwrap_err();
        assert!(matches!(err.source, Error::InvalidRequest { .. }));
        assert!(mock.calls().is_empty());
    }

    #[test]
    fn test_missing_balancer_fails_read() {
        let (mock, _, session) = session(BackendVariant::NextGen);
        mock.fail("getLoadBalancerInstanceDetail", "1200002", "Not found.");
        let mut change = change();
        change.listener_id = Some("31".into());

        let err = session.orchestrator().update_listener(&change).unwrap_err();
        assert!(matches!(err.source, Error::UnexpectedAbsence { .. }));
        assert_eq!(err.failed_step(), Some(&Step::Read));
        assert_eq!(mock.call_count("changeLoadBalancerListenerConfiguration"), 0);
    }
}

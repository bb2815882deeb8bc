//! Scaling policy lifecycle. The parent auto-scaling group is resolved to its
//! provider key before anything is written.

use super::{OperationResult, Orchestrator};
use crate::types::ScalingPolicySpec;
use converge::status::ACTIVE;
use converge::{
    ConvergenceTarget, Error, LifecycleState, Operation, OperationReport, ResourceKind, Result,
    Step, StepOutcome,
};

impl Orchestrator<'_> {
    /// Put a scaling policy on its group and wait until it is listed.
    pub fn create_scaling_policy(&self, spec: &ScalingPolicySpec) -> OperationResult {
        let mut report = OperationReport::new(
            Operation::Create,
            ResourceKind::ScalingPolicy,
            LifecycleState::Absent,
        );
        report.identify(spec.name.as_str());
        let result = self.create_scaling_policy_steps(spec, &mut report);
        report.finish(result)
    }

    /// Delete a scaling policy. A missing policy, or a missing group, counts as done.
    pub fn delete_scaling_policy(&self, group_name: &str, policy_name: &str) -> OperationResult {
        let mut report = OperationReport::new(
            Operation::Delete,
            ResourceKind::ScalingPolicy,
            LifecycleState::Active,
        );
        report.identify(policy_name);
        let result = self.delete_scaling_policy_steps(group_name, policy_name, &mut report);
        report.finish(result)
    }

    fn find_group(&self, group_name: &str) -> Result<Option<String>> {
        let dispatcher = self.session.dispatcher();
        let group = self.retry(&self.session.policies().scaling_busy, || {
            dispatcher.get_auto_scaling_group(group_name)
        })?;
        Ok(group.map(|g| g.id))
    }

    fn create_scaling_policy_steps(
        &self,
        spec: &ScalingPolicySpec,
        report: &mut OperationReport,
    ) -> Result<()> {
        let session = self.session;
        let dispatcher = session.dispatcher();
        let policy = &session.policies().scaling_busy;

        let group_key = report.run(Step::ResolveParent, || {
            self.find_group(&spec.group_name)?.ok_or_else(|| {
                Error::lookup(ResourceKind::AutoScalingGroup.as_str(), spec.group_name.as_str())
            })
        })?;

        report.advance(LifecycleState::Creating);
        report.run(Step::Create, || {
            self.retry(policy, || dispatcher.create_scaling_policy(spec, &group_key))
        })?;

        let target = session.target(
            ConvergenceTarget::reach([ACTIVE]),
            session.config().timeouts.create(),
        );
        self.await_step(
            report,
            Step::AwaitActive,
            ResourceKind::ScalingPolicy,
            &spec.name,
            &target,
            || dispatcher.get_scaling_policy(&spec.name, &group_key),
        )?;

        report.advance(LifecycleState::Active);
        Ok(())
    }

    fn delete_scaling_policy_steps(
        &self,
        group_name: &str,
        policy_name: &str,
        report: &mut OperationReport,
    ) -> Result<()> {
        let session = self.session;
        let dispatcher = session.dispatcher();
        let policy = &session.policies().scaling_busy;

        let group_key = report.run_with(
            Step::ResolveParent,
            || self.find_group(group_name),
            |found| match found {
                Some(_) => StepOutcome::Completed,
                None => StepOutcome::AlreadyDone,
            },
        )?;
        let Some(group_key) = group_key else {
            log::info!("scaling policy {policy_name}: group {group_name} is gone");
            report.advance(LifecycleState::Deleting);
            report.advance(LifecycleState::Absent);
            return Ok(());
        };

        let current = report.run_with(
            Step::Read,
            || self.retry(policy, || dispatcher.get_scaling_policy(policy_name, &group_key)),
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
        report.observe(current);

        report.run(Step::Terminate, || {
            self.retry(policy, || dispatcher.delete_scaling_policy(policy_name, &group_key))
        })?;

        let target = session.target(ConvergenceTarget::gone(), session.config().timeouts.delete());
        self.await_step(
            report,
            Step::AwaitGone,
            ResourceKind::ScalingPolicy,
            policy_name,
            &target,
            || dispatcher.get_scaling_policy(policy_name, &group_key),
        )?;

        report.handle = None;
        report.advance(LifecycleState::Absent);
        Ok(())
    }
}

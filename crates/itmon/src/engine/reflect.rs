//! Policy reflection.
//!
//! Folds per-node overrides and notifier verdicts into the cycle's policy table.
//! Three paths feed it:
//! 1. **By node:** Timeout and protocol-checker faults, applied as soon as they are found.
//! 2. **By transaction:** Each resolved transaction, weighing its slave and master nodes.
//! 3. **By notifier:** A notifier override pins the class for the rest of the cycle.

use tracing::info;

use crate::engine::{InfoId, TriageEngine};
use crate::notifier::NotifyResult;
use crate::policy::{Action, ErrorClass};
use crate::topology::NodeId;

impl TriageEngine {
    /// Applies the node policy of `node` to a fault of `class` found on it.
    pub(crate) fn reflect_policy_by_node(&mut self, node: NodeId, class: ErrorClass) {
        self.policy.mark(class);
        let policy = self.topology.node(node).policy;
        if policy.masks_irq() {
            self.mask_feature(node, class);
        }
        if let Some(job) = policy.job_for(class) {
            self.offer_job(class, job, policy.prio, node);
        }
    }

    /// Applies the node policies of both ends of a transaction.
    ///
    /// When both ends configure a job for the class, the higher priority wins and a
    /// tie goes to the slave side.
    pub(crate) fn reflect_policy(&mut self, id: InfoId) {
        let info = &self.infos[id.0];
        let class = ErrorClass::from(info.errcode);
        let (s_node, m_node) = (info.s_node, info.m_node);
        self.policy.mark(class);

        for node in [s_node, m_node].into_iter().flatten() {
            if self.topology.node(node).policy.masks_irq() {
                self.mask_feature(node, class);
            }
        }

        let job_of = |node: Option<NodeId>| {
            node.and_then(|id| {
                let policy = self.topology.node(id).policy;
                policy.job_for(class).map(|job| (job, policy.prio, id))
            })
        };
        let chosen = match (job_of(s_node), job_of(m_node)) {
            (Some(slave), Some(master)) => Some(if master.1 > slave.1 { master } else { slave }),
            (slave, master) => slave.or(master),
        };
        if let Some((job, prio, node)) = chosen {
            self.offer_job(class, job, prio, node);
        }
    }

    /// Pins the class of transaction `id` if a notifier forced an action.
    pub(crate) fn reflect_policy_by_notifier(&mut self, id: InfoId, result: NotifyResult) {
        let NotifyResult::Override(action) = result else {
            return;
        };
        let class = ErrorClass::from(self.infos[id.0].errcode);
        self.policy.pin(class, action);
        info!(%class, %action, "itmon: notifier pinned policy");
    }

    fn offer_job(&mut self, class: ErrorClass, job: Action, prio: u8, node: NodeId) {
        if self.policy.offer(class, job, prio) {
            info!(
                node = %self.topology.node(node).name,
                %class,
                action = %job,
                prio,
                "itmon: node policy applied"
            );
        }
    }

    /// Disables the feature that raised a fault of `class` on `node`.
    fn mask_feature(&mut self, node: NodeId, class: ErrorClass) {
        let features = &mut self.topology.node_mut(node).features;
        let changed = match class {
            ErrorClass::Timeout => std::mem::replace(&mut features.timeout, false),
            ErrorClass::ProtocolChecker => std::mem::replace(&mut features.prt_chk, false),
            ErrorClass::DecodeError | ErrorClass::SlaveError | ErrorClass::Fatal => {
                std::mem::replace(&mut features.err_report, false)
            }
        };
        if changed {
            info!(node = %self.topology.node(node).name, %class, "itmon: fault source masked");
            self.program_node(node);
        }
    }
}

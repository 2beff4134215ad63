//! Report pass over a cycle's transactions.

use std::fmt;

use tracing::warn;

use crate::common::Direction;
use crate::engine::{InfoId, TriageEngine};
use crate::notifier::NotifyInfo;
use crate::report;

impl TriageEngine {
    /// Reports every transaction, reflects its policy, and runs the notifier chain on it.
    pub(crate) fn report_transactions(&mut self) {
        for idx in 0..self.infos.len() {
            let id = InfoId(idx);
            if let Err(e) = self.write_transaction(id) {
                warn!(error = %e, "itmon: failed to format transaction");
            }

            self.reflect_policy(id);

            let info = &self.infos[idx];
            let result = self.notifiers.call(&NotifyInfo {
                port: &info.port,
                master: &info.master,
                dest: &info.dest,
                read: info.is_read(),
                target_addr: info.target_addr,
                errcode: info.errcode,
                onoff: info.onoff,
            });
            self.reflect_policy_by_notifier(id, result);
        }
    }

    /// Writes the path header, transaction block, and linked raw records of `id`.
    ///
    /// The header and block are each written at most once per transaction.
    pub(crate) fn write_transaction(&mut self, id: InfoId) -> fmt::Result {
        let info = &mut self.infos[id.0];
        if !info.path_dirty {
            report::write_path_info(&mut self.report, info, &self.topology)?;
            info.path_dirty = true;
        }
        if !info.dirty {
            report::write_transaction_info(&mut self.report, info)?;
            info.dirty = true;
            for dir in Direction::ALL {
                for rec in self.records[dir.index()]
                    .iter()
                    .filter(|rec| rec.ref_info == Some(id))
                {
                    report::write_raw_record(&mut self.report, rec, &self.topology)?;
                }
            }
        }
        Ok(())
    }

    /// Dumps records that were not folded into any transaction.
    pub(crate) fn report_unlinked(&mut self) {
        let res = Direction::ALL.into_iter().try_for_each(|dir| {
            self.records[dir.index()]
                .iter()
                .filter(|rec| rec.ref_info.is_none())
                .try_for_each(|rec| report::write_raw_record(&mut self.report, rec, &self.topology))
        });
        if let Err(e) = res {
            warn!(error = %e, "itmon: failed to format raw records");
        }
    }
}

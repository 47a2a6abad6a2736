//! Configuration snapshot.
//!
//! A hardware reset clears the per-queue scheduling parameters. The
//! orchestrator captures them before anything destructive happens and
//! writes them back afterwards, in the order the port enumerates queues.

use crate::port::{PortError, QueueConfig, QueueId, RegisterPort};

/// Per-queue scheduling state saved across a reset.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ConfigSnapshot {
    entries: Vec<(QueueId, QueueConfig)>,
}

/// One queue whose configuration differs between two snapshots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueDiff {
    pub queue: QueueId,
    /// Value in `self`, if the queue is present there.
    pub expected: Option<QueueConfig>,
    /// Value in the other snapshot, if present there.
    pub actual: Option<QueueConfig>,
}

impl ConfigSnapshot {
    /// Reads every queue the port enumerates.
    pub fn capture(port: &dyn RegisterPort) -> Result<Self, PortError> {
        let entries = port
            .queue_ids()
            .into_iter()
            .map(|queue| port.read_queue_config(queue).map(|config| (queue, config)))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { entries })
    }

    /// Writes every captured queue back, in capture order.
    pub fn restore(&self, port: &dyn RegisterPort) -> Result<(), PortError> {
        for (queue, config) in &self.entries {
            port.write_queue_config(*queue, config)?;
        }
        Ok(())
    }

    /// Queues whose configuration differs from `other`.
    pub fn diff(&self, other: &ConfigSnapshot) -> Vec<QueueDiff> {
        let mut diffs: Vec<QueueDiff> = self
            .entries
            .iter()
            .filter_map(|(queue, expected)| {
                let actual = other.get(*queue);
                (actual != Some(expected)).then(|| QueueDiff {
                    queue: *queue,
                    expected: Some(expected.clone()),
                    actual: actual.cloned(),
                })
            })
            .collect();

        diffs.extend(
            other
                .entries
                .iter()
                .filter(|(queue, _)| self.get(*queue).is_none())
                .map(|(queue, actual)| QueueDiff {
                    queue: *queue,
                    expected: None,
                    actual: Some(actual.clone()),
                }),
        );
        diffs
    }

    pub fn get(&self, queue: QueueId) -> Option<&QueueConfig> {
        self.entries
            .iter()
            .find(|(q, _)| *q == queue)
            .map(|(_, config)| config)
    }

    pub fn entries(&self) -> &[(QueueId, QueueConfig)] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::port::sim::{SimulatedEngine, SIM_QUEUE_COUNT};
    use crate::port::ResetTier;
    use crate::recovery::RecoveryScope;

    #[test]
    fn test_capture_reads_every_queue_in_order() {
        let engine = SimulatedEngine::new();
        let snapshot = ConfigSnapshot::capture(&engine).unwrap();
        assert_eq!(snapshot.len(), usize::from(SIM_QUEUE_COUNT));

        let order: Vec<QueueId> = snapshot.entries().iter().map(|(q, _)| *q).collect();
        assert_eq!(order, engine.queue_ids());
    }

    #[test]
    fn test_restore_undoes_reset() {
        let engine = SimulatedEngine::new();
        let before = ConfigSnapshot::capture(&engine).unwrap();

        let handle = engine
            .issue_reset(ResetTier::Warm, RecoveryScope::StopTraffic)
            .unwrap();
        while !engine.poll_reset_complete(handle).unwrap() {}
        let wiped = ConfigSnapshot::capture(&engine).unwrap();
        assert_eq!(before.diff(&wiped).len(), usize::from(SIM_QUEUE_COUNT));

        before.restore(&engine).unwrap();
        assert!(before.diff(&ConfigSnapshot::capture(&engine).unwrap()).is_empty());
    }

    #[test]
    fn test_capture_failure_propagates() {
        let engine = SimulatedEngine::new();
        engine.fail_op("read_queue_config");
        assert!(ConfigSnapshot::capture(&engine).is_err());
    }

    #[test]
    fn test_diff_reports_missing_and_extra_queues() {
        let a = ConfigSnapshot {
            entries: vec![(QueueId(0), QueueConfig(vec![1])), (QueueId(1), QueueConfig(vec![2]))],
        };
        let b = ConfigSnapshot {
            entries: vec![(QueueId(1), QueueConfig(vec![2])), (QueueId(2), QueueConfig(vec![3]))],
        };
        let diffs = a.diff(&b);
        assert_eq!(diffs.len(), 2);
        assert_eq!(diffs[0].queue, QueueId(0));
        assert_eq!(diffs[0].actual, None);
        assert_eq!(diffs[1].queue, QueueId(2));
        assert_eq!(diffs[1].expected, None);
    }

    #[test]
    fn test_corrupted_restore_shows_in_diff() {
        let engine = SimulatedEngine::new();
        engine.corrupt_restore_of(QueueId(5));
        let before = ConfigSnapshot::capture(&engine).unwrap();
        before.restore(&engine).unwrap();

        let diffs = before.diff(&ConfigSnapshot::capture(&engine).unwrap());
        assert_eq!(diffs.len(), 1);
        assert_eq!(diffs[0].queue, QueueId(5));
    }
}

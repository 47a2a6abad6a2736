//! In-memory frame engine.
//!
//! `SimulatedEngine` implements [`RegisterPort`] with enough behaviour to
//! drive the controller end to end: datapaths that make progress unless a
//! hang is injected, queues that drain once admission stops, resets that take
//! a configurable number of polls and wipe queue configuration, and
//! per-operation fault injection. Every mutating call is recorded.

use super::{
    ErrorEvents, LinkConfig, PortError, PortId, PortState, QueueConfig, QueueId, RegisterPort,
    ResetHandle, ResetTier,
};
use crate::datapath::{DatapathId, DatapathMode, Sample, SignalSet};
use crate::recovery::RecoveryScope;
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Number of transmit queues the simulated engine exposes.
pub const SIM_QUEUE_COUNT: u16 = 16;

/// Frames removed from the output queue per depth read once DMA is off or
/// every port drops ingress.
const DRAIN_STEP: u32 = 8;

/// A mutating call made against the simulated engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PortCall {
    SetDmaEnabled(bool),
    SetInterruptsEnabled(bool),
    DumpDiagnostics,
    SetAdminUp(PortId, bool),
    SetIngressDrop(PortId, bool),
    RestoreLinkConfig(PortId),
    PrepareOffloadEngine(u8),
    IssueReset(ResetTier, RecoveryScope),
    ResetCompleted(ResetTier),
    WriteQueueConfig(QueueId),
}

#[derive(Debug)]
struct PendingReset {
    tier: ResetTier,
    polls_remaining: u32,
}

#[derive(Debug)]
struct EngineState {
    gdm_mode: DatapathMode,
    hung: BTreeSet<DatapathId>,
    progress: u32,
    dma_enabled: bool,
    irq_enabled: bool,
    output_queue: u32,
    output_queue_stuck: bool,
    error_events: ErrorEvents,
    ports: BTreeMap<PortId, PortState>,
    offload_busy_polls: Vec<u32>,
    offload_stuck: BTreeSet<u8>,
    queues: BTreeMap<QueueId, QueueConfig>,
    corrupt_on_restore: BTreeSet<QueueId>,
    next_handle: u64,
    pending_resets: HashMap<u64, PendingReset>,
    reset_latency_polls: u32,
    stuck_tiers: BTreeSet<ResetTier>,
    failing_ops: BTreeSet<&'static str>,
    calls: Vec<PortCall>,
}

impl EngineState {
    fn check(&self, op: &'static str) -> Result<(), PortError> {
        if self.failing_ops.contains(op) {
            return Err(PortError::Io {
                op,
                detail: "injected failure".to_string(),
            });
        }
        Ok(())
    }

    fn complete_reset(&mut self, tier: ResetTier) {
        self.hung.clear();
        self.output_queue = 0;
        for config in self.queues.values_mut() {
            config.0.iter_mut().for_each(|word| *word = 0);
        }
        self.calls.push(PortCall::ResetCompleted(tier));
    }
}

/// Simulated frame engine with fault injection.
#[derive(Debug)]
pub struct SimulatedEngine {
    state: Mutex<EngineState>,
}

impl SimulatedEngine {
    /// Creates an engine with two ports (gmac0 up, gmac1 down), two offload
    /// engines and [`SIM_QUEUE_COUNT`] configured queues.
    pub fn new() -> Self {
        let mut ports = BTreeMap::new();
        ports.insert(
            PortId(0),
            PortState {
                admin_up: true,
                ingress_drop: false,
                link: LinkConfig::default(),
            },
        );
        ports.insert(
            PortId(1),
            PortState {
                admin_up: false,
                ingress_drop: false,
                link: LinkConfig {
                    speed_mbps: 10_000,
                    full_duplex: true,
                    pause: false,
                },
            },
        );

        let queues = (0..SIM_QUEUE_COUNT)
            .map(|q| {
                let q32 = u32::from(q);
                (
                    QueueId(q),
                    QueueConfig(vec![0x8000_0000 | q32, 100 + q32 * 10, q32 % 4]),
                )
            })
            .collect();

        Self {
            state: Mutex::new(EngineState {
                gdm_mode: DatapathMode::Gdm,
                hung: BTreeSet::new(),
                progress: 0,
                dma_enabled: true,
                irq_enabled: true,
                output_queue: 0,
                output_queue_stuck: false,
                error_events: ErrorEvents::default(),
                ports,
                offload_busy_polls: vec![0, 0],
                offload_stuck: BTreeSet::new(),
                queues,
                corrupt_on_restore: BTreeSet::new(),
                next_handle: 1,
                pending_resets: HashMap::new(),
                reset_latency_polls: 1,
                stuck_tiers: BTreeSet::new(),
                failing_ops: BTreeSet::new(),
                calls: Vec::new(),
            }),
        }
    }

    // -------------------------------------------------------------------------
    // Fault injection
    // -------------------------------------------------------------------------

    /// Freezes a datapath with pending work until the next completed reset.
    pub fn inject_hang(&self, id: DatapathId) {
        self.state.lock().hung.insert(id);
    }

    /// Lets a hung datapath make progress again without a reset.
    pub fn clear_hang(&self, id: DatapathId) {
        self.state.lock().hung.remove(&id);
    }

    /// Mode reported with GDM samples.
    pub fn set_gdm_mode(&self, mode: DatapathMode) {
        self.state.lock().gdm_mode = mode;
    }

    /// Resets of this tier never report completion.
    pub fn set_reset_stuck(&self, tier: ResetTier) {
        self.state.lock().stuck_tiers.insert(tier);
    }

    /// Polls needed before a reset reports completion.
    pub fn set_reset_latency_polls(&self, polls: u32) {
        self.state.lock().reset_latency_polls = polls;
    }

    /// Makes every call of the named operation fail.
    pub fn fail_op(&self, op: &'static str) {
        self.state.lock().failing_ops.insert(op);
    }

    /// Sets the output queue depth; a stuck queue never drains.
    pub fn set_output_queue(&self, depth: u32, stuck: bool) {
        let mut state = self.state.lock();
        state.output_queue = depth;
        state.output_queue_stuck = stuck;
    }

    /// Sets the error interrupt status returned by the next read.
    pub fn set_error_events(&self, events: ErrorEvents) {
        self.state.lock().error_events = events;
    }

    /// Keeps an offload engine busy for `polls` reads, or forever if stuck.
    pub fn set_offload_busy(&self, engine: u8, polls: u32, stuck: bool) {
        let mut state = self.state.lock();
        if let Some(slot) = state.offload_busy_polls.get_mut(usize::from(engine)) {
            *slot = polls;
        }
        if stuck {
            state.offload_stuck.insert(engine);
        }
    }

    /// Writes to this queue land with a flipped bit.
    pub fn corrupt_restore_of(&self, queue: QueueId) {
        self.state.lock().corrupt_on_restore.insert(queue);
    }

    /// Overwrites a queue configuration directly.
    pub fn set_queue_config(&self, queue: QueueId, config: QueueConfig) {
        self.state.lock().queues.insert(queue, config);
    }

    // -------------------------------------------------------------------------
    // Inspection
    // -------------------------------------------------------------------------

    pub fn calls(&self) -> Vec<PortCall> {
        self.state.lock().calls.clone()
    }

    /// Resets issued so far, in order.
    pub fn resets_issued(&self) -> Vec<(ResetTier, RecoveryScope)> {
        self.state
            .lock()
            .calls
            .iter()
            .filter_map(|call| match call {
                PortCall::IssueReset(tier, scope) => Some((*tier, *scope)),
                _ => None,
            })
            .collect()
    }

    pub fn dma_enabled(&self) -> bool {
        self.state.lock().dma_enabled
    }

    pub fn interrupts_enabled(&self) -> bool {
        self.state.lock().irq_enabled
    }

    pub fn port_state(&self, port: PortId) -> Option<PortState> {
        self.state.lock().ports.get(&port).cloned()
    }

    pub fn is_hung(&self, id: DatapathId) -> bool {
        self.state.lock().hung.contains(&id)
    }
}

impl Default for SimulatedEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl RegisterPort for SimulatedEngine {
    fn read_datapath_sample(&self, id: DatapathId) -> Result<Sample, PortError> {
        let mut state = self.state.lock();
        state.check("read_datapath_sample")?;

        let mode = match id {
            DatapathId::GdmTx | DatapathId::GdmRx => state.gdm_mode,
            _ => DatapathMode::Standard,
        };
        let set = SignalSet::for_datapath(id, mode);
        let mut sample = Sample::new(mode);

        if state.hung.contains(&id) {
            for signal in set.signals() {
                sample.set(signal, 0x40);
            }
        } else {
            state.progress = state.progress.wrapping_add(1);
            for signal in set.backpressure {
                sample.set(*signal, 0);
            }
            for signal in set.progress {
                sample.set(*signal, state.progress);
            }
        }
        Ok(sample)
    }

    fn set_engine_dma_enabled(&self, enabled: bool) -> Result<(), PortError> {
        let mut state = self.state.lock();
        state.check("set_engine_dma_enabled")?;
        state.dma_enabled = enabled;
        state.calls.push(PortCall::SetDmaEnabled(enabled));
        Ok(())
    }

    fn set_interrupts_enabled(&self, enabled: bool) -> Result<(), PortError> {
        let mut state = self.state.lock();
        state.check("set_interrupts_enabled")?;
        state.irq_enabled = enabled;
        state.calls.push(PortCall::SetInterruptsEnabled(enabled));
        Ok(())
    }

    fn output_queue_depth(&self) -> Result<u32, PortError> {
        let mut state = self.state.lock();
        state.check("output_queue_depth")?;
        let depth = state.output_queue;
        let ingress_closed = state.ports.values().all(|port| port.ingress_drop);
        if (!state.dma_enabled || ingress_closed) && !state.output_queue_stuck {
            state.output_queue = depth.saturating_sub(DRAIN_STEP);
        }
        Ok(depth)
    }

    fn read_error_events(&self) -> Result<ErrorEvents, PortError> {
        let mut state = self.state.lock();
        state.check("read_error_events")?;
        Ok(std::mem::take(&mut state.error_events))
    }

    fn dump_diagnostics(&self) -> Result<(), PortError> {
        let mut state = self.state.lock();
        state.check("dump_diagnostics")?;
        state.calls.push(PortCall::DumpDiagnostics);
        Ok(())
    }

    fn port_ids(&self) -> Vec<PortId> {
        self.state.lock().ports.keys().copied().collect()
    }

    fn read_port_state(&self, port: PortId) -> Result<PortState, PortError> {
        let state = self.state.lock();
        state.check("read_port_state")?;
        state
            .ports
            .get(&port)
            .cloned()
            .ok_or_else(|| PortError::Unavailable(port.to_string()))
    }

    fn set_port_admin_up(&self, port: PortId, up: bool) -> Result<(), PortError> {
        let mut state = self.state.lock();
        state.check("set_port_admin_up")?;
        let entry = state
            .ports
            .get_mut(&port)
            .ok_or_else(|| PortError::Unavailable(port.to_string()))?;
        entry.admin_up = up;
        state.calls.push(PortCall::SetAdminUp(port, up));
        Ok(())
    }

    fn set_ingress_drop(&self, port: PortId, drop: bool) -> Result<(), PortError> {
        let mut state = self.state.lock();
        state.check("set_ingress_drop")?;
        let entry = state
            .ports
            .get_mut(&port)
            .ok_or_else(|| PortError::Unavailable(port.to_string()))?;
        entry.ingress_drop = drop;
        state.calls.push(PortCall::SetIngressDrop(port, drop));
        Ok(())
    }

    fn restore_link_config(&self, port: PortId, link: &LinkConfig) -> Result<(), PortError> {
        let mut state = self.state.lock();
        state.check("restore_link_config")?;
        let entry = state
            .ports
            .get_mut(&port)
            .ok_or_else(|| PortError::Unavailable(port.to_string()))?;
        entry.link = link.clone();
        state.calls.push(PortCall::RestoreLinkConfig(port));
        Ok(())
    }

    fn offload_engine_count(&self) -> u8 {
        u8::try_from(self.state.lock().offload_busy_polls.len()).unwrap_or(u8::MAX)
    }

    fn prepare_offload_engine(&self, engine: u8) -> Result<(), PortError> {
        let mut state = self.state.lock();
        state.check("prepare_offload_engine")?;
        state.calls.push(PortCall::PrepareOffloadEngine(engine));
        Ok(())
    }

    fn offload_engine_busy(&self, engine: u8) -> Result<bool, PortError> {
        let mut state = self.state.lock();
        state.check("offload_engine_busy")?;
        if state.offload_stuck.contains(&engine) {
            return Ok(true);
        }
        match state.offload_busy_polls.get_mut(usize::from(engine)) {
            Some(remaining) if *remaining > 0 => {
                *remaining -= 1;
                Ok(true)
            }
            Some(_) => Ok(false),
            None => Err(PortError::Unavailable(format!("ppe{engine}"))),
        }
    }

    fn issue_reset(
        &self,
        tier: ResetTier,
        scope: RecoveryScope,
    ) -> Result<ResetHandle, PortError> {
        let mut state = self.state.lock();
        state.check("issue_reset")?;
        let id = state.next_handle;
        state.next_handle += 1;
        let polls_remaining = state.reset_latency_polls;
        state.pending_resets.insert(
            id,
            PendingReset {
                tier,
                polls_remaining,
            },
        );
        state.calls.push(PortCall::IssueReset(tier, scope));
        Ok(ResetHandle { id, tier })
    }

    fn poll_reset_complete(&self, handle: ResetHandle) -> Result<bool, PortError> {
        let mut state = self.state.lock();
        state.check("poll_reset_complete")?;
        let stuck = state.stuck_tiers.contains(&handle.tier);

        let pending = state
            .pending_resets
            .get_mut(&handle.id)
            .ok_or(PortError::InvalidHandle(handle.id))?;
        if stuck {
            return Ok(false);
        }
        if pending.polls_remaining > 0 {
            pending.polls_remaining -= 1;
            return Ok(false);
        }

        let tier = pending.tier;
        state.pending_resets.remove(&handle.id);
        state.complete_reset(tier);
        Ok(true)
    }

    fn queue_ids(&self) -> Vec<QueueId> {
        self.state.lock().queues.keys().copied().collect()
    }

    fn read_queue_config(&self, queue: QueueId) -> Result<QueueConfig, PortError> {
        let state = self.state.lock();
        state.check("read_queue_config")?;
        state
            .queues
            .get(&queue)
            .cloned()
            .ok_or_else(|| PortError::Unavailable(queue.to_string()))
    }

    fn write_queue_config(&self, queue: QueueId, config: &QueueConfig) -> Result<(), PortError> {
        let mut state = self.state.lock();
        state.check("write_queue_config")?;
        let mut stored = config.clone();
        if state.corrupt_on_restore.contains(&queue) {
            match stored.0.first_mut() {
                Some(word) => *word ^= 1,
                None => stored.0.push(1),
            }
        }
        state.queues.insert(queue, stored);
        state.calls.push(PortCall::WriteQueueConfig(queue));
        Ok(())
    }
}

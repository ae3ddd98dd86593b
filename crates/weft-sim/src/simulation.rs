//! Randomized multi-client runs.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use tracing::{debug, info, warn};
use weft_pending::FlushMode;
use weft_wire::{ChunkedOpContents, ContainerMessageType, SequencedMessage, WireCodec};

use crate::client::SimClient;
use crate::config::SimConfig;
use crate::error::{SimError, SimResult};
use crate::sequencer::Sequencer;

/// Chance that a turn-based client flushes on its turn.
const FLUSH_PROBABILITY: f64 = 0.25;
/// Upper bound on transmit/process rounds while draining.
const MAX_SETTLE_ROUNDS: usize = 64;

/// Counters collected over a run.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct SimStats {
    pub edits: usize,
    pub large_edits: usize,
    pub disconnects: usize,
    pub reconnects: usize,
    pub flush_mode_changes: usize,
    pub flushes: usize,
    pub sequenced: usize,
    pub compressed_batches: usize,
    pub chunk_messages: usize,
    pub settle_rounds: usize,
}

/// Outcome of [`Simulation::run`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SimReport {
    pub seed: u64,
    pub converged: bool,
    pub documents: Vec<String>,
    pub stats: SimStats,
}

impl SimReport {
    pub fn document_len(&self) -> usize {
        self.documents.first().map_or(0, |d| d.chars().count())
    }
}

pub struct Simulation {
    config: SimConfig,
    rng: StdRng,
    sequencer: Sequencer,
    clients: Vec<SimClient>,
    stats: SimStats,
}

impl Simulation {
    /// Build a simulation with every client connected.
    pub fn new(config: SimConfig) -> SimResult<Self> {
        config.validate()?;
        let mut sequencer = Sequencer::new(WireCodec::new(config.wire.max_frame_size));
        let mut clients = Vec::with_capacity(config.clients);
        for index in 0..config.clients {
            let mut client = SimClient::new(index, &config);
            client.connect(&mut sequencer)?;
            clients.push(client);
        }
        Ok(Self {
            rng: StdRng::seed_from_u64(config.seed),
            config,
            sequencer,
            clients,
            stats: SimStats::default(),
        })
    }

    /// Run the configured number of random steps, drain, and compare documents.
    pub fn run(config: SimConfig) -> SimResult<SimReport> {
        let mut simulation = Self::new(config)?;
        info!(
            clients = simulation.config.clients,
            steps = simulation.config.steps,
            seed = simulation.config.seed,
            "simulation started"
        );
        for _ in 0..simulation.config.steps {
            simulation.step()?;
        }
        simulation.drain()?;
        let report = simulation.report();
        if report.converged {
            info!(
                sequenced = report.stats.sequenced,
                len = report.document_len(),
                "simulation converged"
            );
        } else {
            warn!("simulation diverged");
        }
        Ok(report)
    }

    pub fn clients(&self) -> &[SimClient] {
        &self.clients
    }

    pub fn sequencer(&self) -> &Sequencer {
        &self.sequencer
    }

    pub fn stats(&self) -> &SimStats {
        &self.stats
    }

    /// One random action followed by some message traffic.
    pub fn step(&mut self) -> SimResult<()> {
        let count = self.clients.len();
        let actor = self.rng.gen_range(0..count);
        self.act(actor)?;

        let carrier = self.rng.gen_range(0..count);
        self.clients[carrier].transmit(&mut self.sequencer)?;

        let reader = self.rng.gen_range(0..count);
        let limit = self.rng.gen_range(1..=4);
        self.clients[reader].process_inbound(&self.sequencer, limit)?;
        Ok(())
    }

    fn act(&mut self, index: usize) -> SimResult<()> {
        let client = &mut self.clients[index];
        if client.is_connected() {
            if self.rng.gen_bool(self.config.disconnect_probability) {
                debug!(client = index, "disconnect");
                client.disconnect(&mut self.sequencer);
                self.stats.disconnects += 1;
                return Ok(());
            }
        } else if self.rng.gen_bool(self.config.reconnect_probability) {
            debug!(client = index, "reconnect");
            client.connect(&mut self.sequencer)?;
            self.stats.reconnects += 1;
            return Ok(());
        }

        if self.rng.gen_bool(self.config.flush_mode_probability) {
            let mode = match client.flush_mode() {
                FlushMode::Immediate => FlushMode::TurnBased,
                FlushMode::TurnBased => FlushMode::Immediate,
            };
            client.set_flush_mode(mode)?;
            self.stats.flush_mode_changes += 1;
            return Ok(());
        }

        if client.flush_mode() == FlushMode::TurnBased && self.rng.gen_bool(FLUSH_PROBABILITY) {
            client.flush()?;
            self.stats.flushes += 1;
            return Ok(());
        }

        if client.is_connected()
            && client.flush_mode() == FlushMode::Immediate
            && self.rng.gen_bool(self.config.large_edit_probability)
        {
            let text = random_text(&mut self.rng, self.config.large_edit_len);
            let pos = self.rng.gen_range(0..=client.document().chars().count());
            client.insert(pos, &text)?;
            self.stats.large_edits += 1;
            self.stats.edits += 1;
            return Ok(());
        }

        random_edit(&mut self.rng, client)?;
        self.stats.edits += 1;
        Ok(())
    }

    /// Reconnect everyone, switch to immediate flushing, and exchange
    /// messages until every client has acked its ops and read the whole log.
    pub fn drain(&mut self) -> SimResult<()> {
        for client in &mut self.clients {
            if !client.is_connected() {
                client.connect(&mut self.sequencer)?;
                self.stats.reconnects += 1;
            }
            client.set_flush_mode(FlushMode::Immediate)?;
        }

        for round in 1..=MAX_SETTLE_ROUNDS {
            for client in &mut self.clients {
                client.transmit(&mut self.sequencer)?;
            }
            for client in &mut self.clients {
                client.process_inbound(&self.sequencer, usize::MAX)?;
            }
            if self.is_settled() {
                self.stats.settle_rounds = round;
                debug!(rounds = round, "settled");
                return Ok(());
            }
        }
        Err(SimError::NotSettled(MAX_SETTLE_ROUNDS))
    }

    fn is_settled(&self) -> bool {
        self.clients.iter().all(|c| {
            c.is_caught_up(&self.sequencer)
                && !c.has_unsent_frames()
                && !c.has_pending_messages()
                && c.local_branch_len() == 0
        })
    }

    pub fn report(&self) -> SimReport {
        let documents: Vec<String> = self.clients.iter().map(|c| c.document().to_string()).collect();
        let converged = documents.windows(2).all(|w| w[0] == w[1]);
        let log = self.sequencer.log();
        let stats = SimStats {
            sequenced: log.len(),
            compressed_batches: log.iter().filter(|m| is_compressed(m)).count(),
            chunk_messages: log
                .iter()
                .filter(|m| m.message_type == ContainerMessageType::ChunkedOp)
                .count(),
            ..self.stats.clone()
        };
        SimReport {
            seed: self.config.seed,
            converged,
            documents,
            stats,
        }
    }
}

/// Whether a message starts a compressed batch, looking through chunking.
fn is_compressed(message: &SequencedMessage) -> bool {
    if message.compression.is_some() {
        return true;
    }
    message.message_type == ContainerMessageType::ChunkedOp
        && serde_json::from_value::<ChunkedOpContents>(message.contents.clone()).is_ok_and(|chunk| {
            chunk.chunk_id == chunk.total_chunks && chunk.original_compression.is_some()
        })
}

fn random_text(rng: &mut StdRng, len: usize) -> String {
    (0..len).map(|_| char::from(rng.gen_range(b'a'..=b'z'))).collect()
}

fn random_edit(rng: &mut StdRng, client: &mut SimClient) -> SimResult<()> {
    let len = client.document().chars().count();
    if len == 0 || rng.gen_bool(0.65) {
        let pos = rng.gen_range(0..=len);
        let text_len = rng.gen_range(1..=3);
        let text = random_text(rng, text_len);
        client.insert(pos, &text)?;
    } else {
        let pos = rng.gen_range(0..len);
        let count = rng.gen_range(1..=(len - pos).min(3));
        client.delete(pos, count)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use weft_wire::WireError;

    use super::*;

    fn small(seed: u64) -> SimConfig {
        SimConfig {
            steps: 200,
            seed,
            large_edit_len: 20 * 1024,
            ..SimConfig::default()
        }
    }

    #[test]
    fn default_run_converges() {
        let report = Simulation::run(SimConfig::default()).unwrap();
        assert!(report.converged, "{:?}", report.documents);
        assert!(report.stats.sequenced > 0);
        assert_eq!(report.documents.len(), 3);
    }

    #[test]
    fn several_seeds_converge() {
        for seed in 1..=6 {
            let report = Simulation::run(small(seed)).unwrap();
            assert!(report.converged, "seed {seed}: {:?}", report.documents);
        }
    }

    #[test]
    fn churn_heavy_run_converges() {
        let config = SimConfig {
            clients: 4,
            steps: 300,
            seed: 11,
            disconnect_probability: 0.15,
            reconnect_probability: 0.2,
            flush_mode_probability: 0.2,
            large_edit_probability: 0.0,
            ..SimConfig::default()
        };
        let report = Simulation::run(config).unwrap();
        assert!(report.converged);
        assert!(report.stats.disconnects > 0);
        assert!(report.stats.flush_mode_changes > 0);
    }

    #[test]
    fn large_edits_travel_compressed_and_chunked() {
        let config = SimConfig {
            clients: 2,
            steps: 40,
            seed: 3,
            disconnect_probability: 0.0,
            flush_mode_probability: 0.0,
            large_edit_probability: 0.2,
            ..SimConfig::default()
        };
        let report = Simulation::run(config).unwrap();
        assert!(report.converged);
        assert!(report.stats.large_edits > 0);
        assert!(report.stats.compressed_batches > 0);
        assert!(report.stats.chunk_messages > 0);
    }

    #[test]
    fn oversized_op_without_chunking_fails() {
        let mut config = SimConfig {
            clients: 1,
            steps: 1,
            disconnect_probability: 0.0,
            flush_mode_probability: 0.0,
            large_edit_probability: 1.0,
            ..SimConfig::default()
        };
        config.wire.chunking_enabled = false;
        let err = Simulation::run(config).unwrap_err();
        assert!(matches!(
            err,
            SimError::Wire(WireError::BatchTooLarge { .. })
        ));
    }

    #[test]
    fn same_seed_same_report() {
        let a = Simulation::run(small(5)).unwrap();
        let b = Simulation::run(small(5)).unwrap();
        assert_eq!(a.documents, b.documents);
        assert_eq!(a.stats.sequenced, b.stats.sequenced);
    }

    #[test]
    fn invalid_config_is_rejected() {
        let config = SimConfig {
            clients: 0,
            ..SimConfig::default()
        };
        assert!(matches!(Simulation::run(config), Err(SimError::Config(_))));
    }
}

//! The per-instance consensus process and its event loop.
//!
//! One [`ConsensusProcess`] drives one agreement instance. The spawned loop
//! is the single consumer of the inbox and the sole owner of all trackers
//! and state, so nothing here needs locking. The loop suspends only at its
//! select over inbox, round timer, and close signal.

use crate::builder::{BuildError, MessageBuilder};
use crate::codec::{self, CodecError, GOSSIP_PROTOCOL};
use crate::roles::{self, Role};
use crate::traits::{InboundMessage, NetworkService, RoleOracle, TerminationOutput};
use crate::trackers::{
    CommitTracker, NotifyTracker, PreRoundTracker, ProposalTracker, StatusTracker,
};
use crate::validator::MessageValidator;
use crate::Round;
use hare_types::{
    eligibility_seed, Certificate, HareConfig, HareMessage, InstanceId, Keypair, MessageType,
    PublicKey, ValueSet,
};
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::mem;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

/// Errors from starting a process.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StartError {
    /// The process event loop was already spawned.
    #[error("consensus process already started")]
    AlreadyStarted,
}

/// Fatal event-loop errors.
///
/// Both variants concern outgoing messages the process built itself, so
/// hitting one indicates a local bug rather than peer behaviour. The loop
/// exits; broadcast failures, by contrast, are logged and survived.
#[derive(Debug, Error)]
pub enum ProcessError {
    /// An outgoing message could not be encoded.
    #[error("failed to encode outgoing message: {0}")]
    Serialization(#[from] CodecError),

    /// An outgoing message could not be assembled.
    #[error("failed to build outgoing message: {0}")]
    Build(#[from] BuildError),
}

/// Cloneable cancellation handle shared by the loop and external closers.
#[derive(Debug, Clone, Default)]
pub struct Closer {
    token: CancellationToken,
}

impl Closer {
    /// Create an open closer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Signal the process to stop. Idempotent.
    pub fn close(&self) {
        self.token.cancel();
    }

    /// Has the process been told to stop?
    pub fn is_closed(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Wait for the close signal.
    pub async fn closed(&self) {
        self.token.cancelled().await;
    }
}

/// Protocol state of one instance.
#[derive(Debug, Clone)]
pub struct State {
    /// Round counter. Strictly increasing; `k / 4` is the iteration.
    pub k: u32,
    /// Iteration in which `s` was last committed upon, or -1 for never.
    pub ki: i32,
    /// The current candidate set.
    pub s: ValueSet,
    /// Certificate proving the most recent commit of `s`, if any.
    pub certificate: Option<Certificate>,
}

impl State {
    fn new(initial_set: ValueSet) -> Self {
        Self {
            k: 0,
            ki: -1,
            s: initial_set,
            certificate: None,
        }
    }
}

/// Handle to one agreement instance.
///
/// Construction wires the channels; [`ConsensusProcess::start`] spawns the
/// event loop, which then owns all protocol state. The handle stays behind
/// for identification, inbound delivery, and cancellation.
pub struct ConsensusProcess {
    instance_id: InstanceId,
    inbox_tx: mpsc::Sender<InboundMessage>,
    closer: Closer,
    core: Option<ProcessCore>,
}

impl ConsensusProcess {
    /// Create a process for one instance.
    ///
    /// `initial_set` is this participant's starting candidate set. The
    /// termination output is delivered on `termination_tx`, which must be
    /// buffered (capacity at least 1). The oracle and network are shared
    /// across instances and must be safe for concurrent use.
    pub fn new(
        config: HareConfig,
        instance_id: InstanceId,
        initial_set: ValueSet,
        oracle: Arc<dyn RoleOracle>,
        signing: Keypair,
        network: Arc<dyn NetworkService>,
        termination_tx: mpsc::Sender<TerminationOutput>,
    ) -> Self {
        let (inbox_tx, inbox_rx) = mpsc::channel(4 * config.n.max(2));
        let closer = Closer::new();
        let core = ProcessCore {
            state: State::new(initial_set),
            validator: MessageValidator::new(config.threshold()),
            pre_round: PreRoundTracker::new(config.threshold()),
            statuses: None,
            proposals: None,
            commits: None,
            notifies: NotifyTracker::new(),
            pending: HashMap::new(),
            notify_sent: false,
            terminating: false,
            config,
            instance_id,
            oracle,
            signing,
            network,
            inbox_tx: inbox_tx.clone(),
            inbox_rx,
            termination_tx,
            closer: closer.clone(),
        };
        Self {
            instance_id,
            inbox_tx,
            closer,
            core: Some(core),
        }
    }

    /// The instance this process runs.
    pub fn id(&self) -> InstanceId {
        self.instance_id
    }

    /// Sender half of the inbox. The broker delivers decoded messages for
    /// this instance here.
    pub fn inbox(&self) -> mpsc::Sender<InboundMessage> {
        self.inbox_tx.clone()
    }

    /// Cancellation handle. Cloning lets several owners request shutdown.
    pub fn closer(&self) -> Closer {
        self.closer.clone()
    }

    /// Request shutdown. The loop observes it at its next suspension.
    pub fn close(&self) {
        self.closer.close();
    }

    /// Spawn the event loop. Fails on the second call.
    pub fn start(&mut self) -> Result<JoinHandle<()>, StartError> {
        let core = self.core.take().ok_or(StartError::AlreadyStarted)?;
        Ok(tokio::spawn(core.run()))
    }
}

/// The event loop's state. Moved into the spawned task on start.
struct ProcessCore {
    state: State,
    config: HareConfig,
    instance_id: InstanceId,
    oracle: Arc<dyn RoleOracle>,
    signing: Keypair,
    network: Arc<dyn NetworkService>,
    validator: MessageValidator,
    pre_round: PreRoundTracker,
    statuses: Option<StatusTracker>,
    proposals: Option<ProposalTracker>,
    commits: Option<CommitTracker>,
    notifies: NotifyTracker,
    /// Early messages stashed for the next round, first-wins per sender.
    pending: HashMap<PublicKey, InboundMessage>,
    notify_sent: bool,
    terminating: bool,
    inbox_tx: mpsc::Sender<InboundMessage>,
    inbox_rx: mpsc::Receiver<InboundMessage>,
    termination_tx: mpsc::Sender<TerminationOutput>,
    closer: Closer,
}

impl ProcessCore {
    async fn run(mut self) {
        let started_at = Instant::now();
        if let Err(err) = self.run_inner().await {
            error!(instance = %self.instance_id, error = %err, "consensus process failed");
        }
        debug!(
            instance = %self.instance_id,
            elapsed_ms = started_at.elapsed().as_millis() as u64,
            "consensus process stopped"
        );
    }

    async fn run_inner(&mut self) -> Result<(), ProcessError> {
        info!(instance = %self.instance_id, size = self.state.s.len(), "consensus process listening");

        // Bootstrap: advertise the starting set and collect advertisements
        // from peers for one round duration.
        let pre_round_msg = self
            .default_builder(self.state.s.clone())
            .message_type(MessageType::PreRound)
            .sign(&self.signing)
            .build()?;
        self.send_message(pre_round_msg)?;

        let pre_round_timer = time::sleep(self.config.round_duration);
        tokio::pin!(pre_round_timer);
        loop {
            tokio::select! {
                inbound = self.inbox_rx.recv() => match inbound {
                    Some(inbound) => {
                        self.handle_message(inbound).await;
                        if self.terminating {
                            return Ok(());
                        }
                    }
                    None => return Ok(()),
                },
                _ = &mut pre_round_timer => break,
                _ = self.closer.closed() => {
                    info!(instance = %self.instance_id, "close requested during pre-round");
                    return Ok(());
                }
            }
        }

        self.pre_round.filter_set(&mut self.state.s);
        if self.state.s.is_empty() {
            // No value survived proving. The instance keeps cadence but
            // will never propose or terminate with output.
            error!(instance = %self.instance_id, "pre-round ended with an empty proven set");
        }

        self.on_round_begin()?;
        let mut ticker = time::interval_at(
            Instant::now() + self.config.round_duration,
            self.config.round_duration,
        );
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                inbound = self.inbox_rx.recv() => match inbound {
                    Some(inbound) => {
                        self.handle_message(inbound).await;
                        if self.terminating {
                            info!(instance = %self.instance_id, "terminating");
                            return Ok(());
                        }
                    }
                    None => return Ok(()),
                },
                _ = ticker.tick() => {
                    self.on_round_end()?;
                    self.state.k += 1;
                    self.on_round_begin()?;
                }
                _ = self.closer.closed() => {
                    info!(instance = %self.instance_id, "close requested, stopping event loop");
                    return Ok(());
                }
            }
        }
    }

    // ─── Inbound handling ───

    async fn handle_message(&mut self, mut inbound: InboundMessage) {
        // The broker has already matched the instance id; everything else
        // is checked here.
        if !self.validate_role(&inbound.message) {
            warn!(sender = %inbound.message.pub_key, "role validation failed");
            inbound.report_validation(false);
            return;
        }

        if let Err(err) = self.validator.validate_syntax(&inbound.message) {
            warn!(sender = %inbound.message.pub_key, error = %err, "syntactic validation failed");
            inbound.report_validation(false);
            return;
        }

        // Contextual outcomes are not part of the report: peers may
        // legitimately disagree on the current round.
        inbound.report_validation(true);

        if self
            .validator
            .validate_context(&inbound.message, self.state.k)
            .is_err()
        {
            if self
                .validator
                .validate_context(&inbound.message, self.state.k + 1)
                .is_ok()
            {
                debug!(
                    sender = %inbound.message.pub_key,
                    msg_k = inbound.message.inner.k,
                    k = self.state.k,
                    "early message stashed"
                );
                self.on_early_message(inbound);
            } else {
                debug!(
                    sender = %inbound.message.pub_key,
                    msg_k = inbound.message.inner.k,
                    k = self.state.k,
                    "message valid for neither this nor the next round, dropped"
                );
            }
            return;
        }

        self.process_message(inbound.message).await;
    }

    fn validate_role(&self, msg: &HareMessage) -> bool {
        let k = msg.inner.k;
        if !roles::validate_role_proof(&msg.pub_key, k, &msg.inner.role_proof) {
            warn!(sender = %msg.pub_key, msg_k = k, "role proof signature invalid");
            return false;
        }
        let seed = eligibility_seed(self.instance_id, k);
        let committee = roles::expected_committee_size(k, self.config.n);
        match self
            .oracle
            .eligible(seed, committee, &msg.pub_key, &msg.inner.role_proof)
        {
            Ok(eligible) => eligible,
            Err(err) => {
                warn!(error = %err, "oracle unavailable, treating sender as not eligible");
                false
            }
        }
    }

    fn on_early_message(&mut self, inbound: InboundMessage) {
        match self.pending.entry(inbound.message.pub_key) {
            Entry::Occupied(_) => {
                debug!(sender = %inbound.message.pub_key, "already holding an early message from sender");
            }
            Entry::Vacant(slot) => {
                slot.insert(inbound);
            }
        }
    }

    async fn process_message(&mut self, msg: HareMessage) {
        trace!(
            sender = %msg.pub_key,
            msg_type = msg.inner.message_type.name(),
            msg_k = msg.inner.k,
            "processing message"
        );
        match msg.inner.message_type {
            MessageType::PreRound => self.pre_round.on_pre_round(&msg),
            MessageType::Status => {
                if let Some(tracker) = self.statuses.as_mut() {
                    tracker.record_status(msg);
                }
            }
            MessageType::Proposal => {
                if let Some(tracker) = self.proposals.as_mut() {
                    if Round::from_counter(self.state.k) == Round::Proposal {
                        tracker.on_proposal(msg);
                    } else {
                        tracker.on_late_proposal(&msg);
                    }
                }
            }
            MessageType::Commit => {
                if let Some(tracker) = self.commits.as_mut() {
                    tracker.on_commit(msg);
                }
            }
            MessageType::Notify => self.process_notify(msg).await,
        }
    }

    async fn process_notify(&mut self, msg: HareMessage) {
        let set = msg.value_set();
        if self.notifies.on_notify(&msg) {
            debug!(sender = %msg.pub_key, "duplicate notification ignored");
            return;
        }

        // Adopt the notified set during the notify round, but never regress
        // to an older committed iteration.
        if Round::from_counter(self.state.k) == Round::Notify && msg.inner.ki >= self.state.ki {
            self.state.s = set.clone();
            self.state.certificate = msg.certificate.clone();
            self.state.ki = msg.inner.ki;
        }

        if self.notifies.notifications_count(&set) < self.config.threshold() {
            return;
        }

        // Enough notifications: agreement reached.
        self.state.s = set;
        info!(
            instance = %self.instance_id,
            k = self.state.k,
            set = ?self.state.s,
            "consensus process terminated with output"
        );
        let output = TerminationOutput {
            instance_id: self.instance_id,
            agreed_set: self.state.s.clone(),
        };
        if self.termination_tx.send(output).await.is_err() {
            warn!(instance = %self.instance_id, "termination consumer dropped");
        }
        self.closer.close();
        self.terminating = true;
    }

    // ─── Round cadence ───

    fn on_round_end(&mut self) -> Result<(), ProcessError> {
        debug!(instance = %self.instance_id, k = self.state.k, "round ended");
        match Round::from_counter(self.state.k) {
            Round::Status => self.end_status_round(),
            Round::Commit => self.end_commit_round()?,
            Round::Proposal | Round::Notify => {}
        }
        Ok(())
    }

    fn on_round_begin(&mut self) -> Result<(), ProcessError> {
        debug!(
            instance = %self.instance_id,
            k = self.state.k,
            round = ?Round::from_counter(self.state.k),
            "round began"
        );
        match Round::from_counter(self.state.k) {
            Round::Status => self.begin_status_round()?,
            Round::Proposal => self.begin_proposal_round()?,
            Round::Commit => self.begin_commit_round()?,
            Round::Notify => self.begin_notify_round(),
        }

        // Give stashed early messages one fresh validation pass under the
        // new round counter, off the loop's critical path.
        let pending = mem::take(&mut self.pending);
        if !pending.is_empty() {
            debug!(count = pending.len(), "re-injecting early messages");
            let inbox = self.inbox_tx.clone();
            tokio::spawn(async move {
                for (_, inbound) in pending {
                    if inbox.send(inbound).await.is_err() {
                        break;
                    }
                }
            });
        }
        Ok(())
    }

    fn begin_status_round(&mut self) -> Result<(), ProcessError> {
        self.statuses = Some(StatusTracker::new(self.config.threshold()));
        let msg = self
            .default_builder(self.state.s.clone())
            .message_type(MessageType::Status)
            .sign(&self.signing)
            .build()?;
        self.send_message(msg)
    }

    fn end_status_round(&mut self) {
        let Some(mut statuses) = self.statuses.take() else {
            return;
        };
        let pre_round = &self.pre_round;
        let notifies = &self.notifies;
        statuses.analyze_statuses(|msg| Self::status_proving(pre_round, notifies, msg));
        self.statuses = Some(statuses);
    }

    fn begin_proposal_round(&mut self) -> Result<(), ProcessError> {
        self.proposals = Some(ProposalTracker::new());

        // The status record has served its purpose once the proposal is
        // out; drop it either way.
        let Some(statuses) = self.statuses.take() else {
            return Ok(());
        };
        if self.current_role() != Role::Leader || !statuses.is_svp_ready() {
            return Ok(());
        }
        match statuses.build_svp() {
            Some(svp) => {
                let proposal_set = statuses.proposal_set(self.config.set_size);
                let msg = self
                    .default_builder(proposal_set)
                    .message_type(MessageType::Proposal)
                    .svp(svp)
                    .sign(&self.signing)
                    .build()?;
                self.send_message(msg)?;
            }
            None => error!("safe-value proof reported ready but could not be built"),
        }
        Ok(())
    }

    fn begin_commit_round(&mut self) -> Result<(), ProcessError> {
        let proposed = self
            .proposals
            .as_ref()
            .and_then(ProposalTracker::proposed_set);

        // With no unique proposal the tracker stays inert and the
        // iteration cannot commit.
        self.commits = Some(CommitTracker::new(self.config.threshold(), proposed.clone()));

        if let Some(set) = proposed {
            let msg = self
                .default_builder(set)
                .message_type(MessageType::Commit)
                .sign(&self.signing)
                .build()?;
            self.send_message(msg)?;
        }
        Ok(())
    }

    fn end_commit_round(&mut self) -> Result<(), ProcessError> {
        // Only one notification per process, ever.
        if self.notify_sent {
            return Ok(());
        }
        let Some(proposals) = &self.proposals else {
            return Ok(());
        };
        if proposals.is_conflicting() {
            debug!(instance = %self.instance_id, k = self.state.k, "conflicting proposals, no commit");
            return Ok(());
        }
        let Some(commits) = &self.commits else {
            return Ok(());
        };
        if !commits.has_enough_commits() {
            return Ok(());
        }
        let Some(certificate) = commits.build_certificate() else {
            return Ok(());
        };
        let Some(set) = proposals.proposed_set() else {
            return Ok(());
        };

        // Commit: adopt the set and remember the iteration it was
        // committed in, then tell everyone.
        self.state.s = set;
        self.state.certificate = Some(certificate.clone());
        self.state.ki = Round::iteration(self.state.k) as i32;
        let msg = self
            .default_builder(self.state.s.clone())
            .message_type(MessageType::Notify)
            .certificate(certificate)
            .sign(&self.signing)
            .build()?;
        self.send_message(msg)?;
        self.notify_sent = true;
        info!(
            instance = %self.instance_id,
            k = self.state.k,
            set = ?self.state.s,
            "committed, notification broadcast"
        );
        Ok(())
    }

    fn begin_notify_round(&mut self) {
        self.commits = None;
        self.proposals = None;
    }

    // ─── Outbound ───

    fn default_builder(&self, values: ValueSet) -> MessageBuilder {
        MessageBuilder::new()
            .pub_key(self.signing.public_key())
            .instance_id(self.instance_id)
            .round_counter(self.state.k)
            .ki(self.state.ki)
            .values(values)
            .role_proof(roles::role_proof(&self.signing, self.state.k))
    }

    /// Broadcast a message if this participant is eligible this round.
    ///
    /// Encoding failure is fatal (the message is our own construction);
    /// broadcast failure is not, because gossip redundancy covers it.
    fn send_message(&self, msg: HareMessage) -> Result<(), ProcessError> {
        if !self.is_eligible() {
            debug!(
                instance = %self.instance_id,
                k = self.state.k,
                msg_type = msg.inner.message_type.name(),
                "not eligible this round, staying silent"
            );
            return Ok(());
        }

        let payload = codec::encode_message(&msg)?;
        if let Err(err) = self.network.broadcast(GOSSIP_PROTOCOL, payload) {
            warn!(
                instance = %self.instance_id,
                error = %err,
                "broadcast failed, continuing round"
            );
        }
        Ok(())
    }

    // ─── Roles ───

    fn is_eligible(&self) -> bool {
        self.current_role() != Role::Passive
    }

    fn current_role(&self) -> Role {
        let k = self.state.k;
        let proof = roles::role_proof(&self.signing, k);
        let seed = eligibility_seed(self.instance_id, k);
        let committee = roles::expected_committee_size(k, self.config.n);
        match self
            .oracle
            .eligible(seed, committee, &self.signing.public_key(), &proof)
        {
            Ok(true) if Round::from_counter(k) == Round::Proposal => Role::Leader,
            Ok(true) => Role::Active,
            Ok(false) => Role::Passive,
            Err(err) => {
                warn!(error = %err, "oracle unavailable, staying passive this round");
                Role::Passive
            }
        }
    }

    fn status_proving(
        pre_round: &PreRoundTracker,
        notifies: &NotifyTracker,
        msg: &HareMessage,
    ) -> bool {
        let set = msg.value_set();
        if msg.inner.ki == -1 {
            // Never committed: every value must be preround-justified.
            pre_round.can_prove_set(&set)
        } else {
            // Claims a prior commit: demand the matching certificate.
            notifies.has_certificate(msg.inner.ki, &set)
        }
    }
}

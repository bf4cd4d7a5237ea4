//! Simulation configuration.
//!
//! All policy switches recognized by the decision engine live here, with
//! CLI/env bindings. The binary parses one [`SimConfig`] and threads it by
//! reference through every stage; nothing reads ambient globals.

use serde::{Deserialize, Serialize};

/// Default key width in bits.
pub const DEFAULT_BITS: u32 = 16;
/// Ticks between advances of the originator index in fixed-cadence mode.
pub const ORIGINATOR_ROTATION_CADENCE: u64 = 100;
/// Size of the hot prefix of the content space used when preferred chunks
/// are enabled; half of all fresh draws land in it.
pub const NUM_PREFERRED_CHUNKS: u32 = 1000;

/// Which peers pay a rejecting-but-payable next hop.
#[derive(
    clap::ValueEnum, Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize,
)]
pub enum PaymentPolicy {
    /// Payment (and continuation through a rejecting peer) only happens
    /// when the current node is the original requester.
    #[default]
    OnlyOriginatorPays,
    /// A forwarder pays if the previous node in the route paid, seeding the
    /// chain at the originator.
    PayIfOrigPays,
    /// Every payment-eligible rejecting candidate is paid unconditionally.
    AlwaysPays,
}

/// Scheduling model for the worker pipeline.
#[derive(clap::ValueEnum, Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScheduleMode {
    /// A fixed pool of threads, each running the full
    /// generate-route-commit cycle for a share of the iterations.
    Coarse,
    /// Staged generator/router/committer threads connected by bounded
    /// queues with back-pressure.
    #[default]
    Pipeline,
}

#[derive(clap::Parser, Debug, Clone, Serialize, Deserialize)]
pub struct SimConfig {
    /// Key width of the node/chunk id space, in bits.
    #[clap(long, default_value_t = DEFAULT_BITS, env = "KADSIM_BITS")]
    pub bits: u32,

    /// Minimum shared-prefix length to the chunk id at which a node counts
    /// as holding the content.
    #[clap(long, default_value_t = 0)]
    pub storage_depth: u32,

    /// Cadence, in ticks, at which deferred (pending) requests are released
    /// for retry.
    #[clap(long, default_value_t = 20)]
    pub epoch: u64,

    /// Serialize evaluation of each directed edge during hop selection.
    /// Disable for single-threaded baseline runs.
    #[clap(long, default_value_t = true, action = clap::ArgAction::Set)]
    pub edge_lock_enabled: bool,

    /// Allow continuation through rejecting peers against payment.
    #[clap(long, default_value_t = true, action = clap::ArgAction::Set)]
    pub payment_enabled: bool,

    /// Who pays a rejecting-but-payable next hop.
    #[clap(long, value_enum, default_value_t = PaymentPolicy::OnlyOriginatorPays)]
    pub payment_policy: PaymentPolicy,

    /// Rewrite sparse payment lists of successful routes into a dense
    /// per-hop chain.
    #[clap(long, default_value_t = false, action = clap::ArgAction::Set)]
    pub forwarders_pay_force_originator_to_pay: bool,

    /// Queue failed requests for epoch-scheduled reattempts.
    #[clap(long, default_value_t = false, action = clap::ArgAction::Set)]
    pub waiting_enabled: bool,

    /// Resubmit failed requests immediately, steering around the peers that
    /// were part of the failed route.
    #[clap(long, default_value_t = false, action = clap::ArgAction::Set)]
    pub retry_with_another_peer: bool,

    /// Short-circuit routing through per-node chunk caches.
    #[clap(long, default_value_t = false, action = clap::ArgAction::Set)]
    pub cache_enabled: bool,

    /// Bounded per-node cache capacity, in chunks.
    #[clap(long, default_value_t = 100)]
    pub cache_size: usize,

    /// Bias half of all fresh chunk draws into the hot prefix of the
    /// content space.
    #[clap(long, default_value_t = false, action = clap::ArgAction::Set)]
    pub preferred_chunks_enabled: bool,

    /// Count an iteration only when a fresh (non-retried) chunk is drawn.
    #[clap(long, default_value_t = false, action = clap::ArgAction::Set)]
    pub iteration_means_unique_chunk: bool,

    /// Hold the originator fixed for a cadence of ticks instead of rotating
    /// every tick.
    #[clap(long, default_value_t = false, action = clap::ArgAction::Set)]
    pub same_originator: bool,

    /// Number of originators taking turns issuing requests.
    #[clap(long, default_value_t = 1000)]
    pub originator_count: usize,

    /// Size of the chunk id space requests are drawn from. Defaults to
    /// `2^bits` when not set.
    #[clap(long)]
    pub content_space_size: Option<u32>,

    /// Accumulated-debt ceiling above which a peer rejects a request.
    #[clap(long, default_value_t = 16)]
    pub threshold: i64,

    /// Debt accrued on an edge per forwarded request, and the unit price of
    /// a payment.
    #[clap(long, default_value_t = 1)]
    pub price: i64,

    /// Forgive accrued edge debt at `price` per elapsed epoch.
    #[clap(long, default_value_t = true, action = clap::ArgAction::Set)]
    pub forgiveness_enabled: bool,

    /// Seed for the request generator. Single-worker runs with the same
    /// seed are bit-for-bit reproducible.
    #[clap(long, default_value_t = 0x6b61_6473)]
    pub seed: u64,

    /// Total number of requests to simulate.
    #[clap(long, default_value_t = 100_000)]
    pub iterations: u64,

    /// Number of routing workers.
    #[clap(long, default_value_t = 8)]
    pub workers: usize,

    /// Scheduling model driving the workers.
    #[clap(long, value_enum, default_value_t = ScheduleMode::Pipeline)]
    pub schedule: ScheduleMode,
}

impl SimConfig {
    /// Effective size of the chunk id space.
    pub fn content_space(&self) -> u32 {
        self.content_space_size
            .unwrap_or_else(|| 1u32.checked_shl(self.bits).unwrap_or(u32::MAX))
    }
}

impl Default for SimConfig {
    fn default() -> Self {
        use clap::Parser;
        Self::parse_from(std::iter::empty::<std::ffi::OsString>())
    }
}

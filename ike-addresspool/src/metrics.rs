//! Address-pool occupancy gauges and lease-engine activity counters,
//! in the host project's `lazy_static!` + typed-metric style, scoped down
//! to the handful of numbers this crate actually has state for (§10.4).

use lazy_static::lazy_static;
use prometheus::{register_int_counter, register_int_gauge, IntCounter, IntGauge};

lazy_static! {
    /// Leases currently held by at least one connection, summed over every
    /// pool that has called [`record_pool_gauges`].
    pub static ref POOL_NR_IN_USE: IntGauge =
        register_int_gauge!("ike_addresspool_nr_in_use", "leases currently in use").unwrap();
    /// Current length of the lease array, summed over every observed pool.
    pub static ref POOL_NR_LEASES: IntGauge =
        register_int_gauge!("ike_addresspool_nr_leases", "current lease array length").unwrap();
    /// Cardinality of the address range, summed over every observed pool.
    pub static ref POOL_SIZE: IntGauge =
        register_int_gauge!("ike_addresspool_size", "address range cardinality").unwrap();
    pub static ref LEASES_ACQUIRED: IntCounter =
        register_int_counter!("ike_addresspool_leases_acquired_total", "acquire() calls that returned an address").unwrap();
    pub static ref LEASES_RECLAIMED: IntCounter =
        register_int_counter!("ike_addresspool_leases_reclaimed_total", "acquires satisfied by reclaiming a lingering lease by name").unwrap();
    pub static ref LEASES_STOLEN: IntCounter =
        register_int_counter!("ike_addresspool_leases_stolen_total", "lingering leases whose reuse name was stolen").unwrap();
    pub static ref LEASES_RELEASED: IntCounter =
        register_int_counter!("ike_addresspool_leases_released_total", "release() calls").unwrap();
    pub static ref POOL_GROWTHS: IntCounter =
        register_int_counter!("ike_addresspool_growths_total", "lease array growths").unwrap();
    pub static ref POOL_EXHAUSTIONS: IntCounter =
        register_int_counter!("ike_addresspool_exhaustions_total", "acquire() calls that failed with no free address").unwrap();
    pub static ref POOL_OVERLAPS_REFUSED: IntCounter =
        register_int_counter!("ike_addresspool_overlaps_refused_total", "install() calls refused for partial range overlap").unwrap();
}

/// Snapshots a pool's occupancy gauges. Called by the owner after any
/// mutating operation; gauges are process-wide, not per-pool, matching
/// this crate's scoped-down single-pool-at-a-time metrics surface.
pub fn record_pool_gauges(nr_in_use: usize, nr_leases: usize, size: u32) {
    POOL_NR_IN_USE.set(nr_in_use as i64);
    POOL_NR_LEASES.set(nr_leases as i64);
    POOL_SIZE.set(size as i64);
}

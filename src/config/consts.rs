// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

/// Default liveness tick for parked engine calls (100 ms)
pub const DEFAULT_LIVENESS_TICK_MS: u64 = 100;
/// Minimum allowed liveness tick (1 ms)
pub const MIN_LIVENESS_TICK_MS: u64 = 1;
/// Maximum allowed liveness tick (10 s); removal must be noticed within one tick
pub const MAX_LIVENESS_TICK_MS: u64 = 10_000;

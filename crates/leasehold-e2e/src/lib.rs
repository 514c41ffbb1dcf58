//! End-to-end tests for leasehold live under `tests/`. They spawn the
//! `leasehold-server` and `leasehold` binaries from the workspace target
//! directory, so build the workspace before running them.

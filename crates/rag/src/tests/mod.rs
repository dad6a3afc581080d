//! Cross-component tests for indexing, sync status, retrieval and engine wiring.

mod support;

mod sync_status;

//! Result clone & respec controller.
//!
//! Cached results are never rewritten. To point an analysis at another slice
//! of the data, clone the results first: each clone is a new, untriggered
//! registration of the same action on the same dataset binding. The spec can
//! then be replaced, and the next trigger runs all clones together in one
//! pass over the new spec while the originals keep their values.

use std::ops::Range;

use evgraph_core::error::Result;
use evgraph_core::spec::{DatasetSpec, SpecVersion};

use crate::runtime::ResultHandle;
use crate::scheduler::Binding;

/// Untriggered copy of `handle`'s action, pending on the same binding.
pub fn clone_result_and_action(handle: &ResultHandle) -> Result<ResultHandle> {
    let binding = handle.binding().clone();
    let slot = binding.clone_slot(handle.slot())?;
    Ok(ResultHandle::new(binding, slot))
}

/// Replace the spec of `binding`. Fails with `SpecChangeWhileTriggered` when
/// the binding holds cached results and something other than clones is
/// pending.
pub fn change_spec(binding: &Binding, spec: DatasetSpec) -> Result<SpecVersion> {
    binding.respec(|_| spec)
}

/// Keep the samples and restrict the logical span to `range`.
pub fn change_entry_range(binding: &Binding, range: Range<u64>) -> Result<SpecVersion> {
    binding.respec(|current| current.clone().with_global_range(range))
}

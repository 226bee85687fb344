//! Sorter configuration and memory layout.
//!
//! [`SortConfig`] carries the tuning parameters; [`SortConfig::layout`]
//! derives the fixed buffer sizes and fan-ins from them. The *current*
//! buffer sizes additionally depend on the live [`PhaseState`] and are
//! computed at the moment a queue opens its storage, not when the queue is
//! constructed.

use std::cell::Cell;

use xxl_common::constants::DEFAULT_BLOCK_SIZE;
use xxl_common::error::{XxlError, XxlResult};

/// Configuration for a merge sorter.
///
/// The four ratios steer how the memory budget is split; `0.0` gives each
/// buffer a single block and maximizes heap size and fan-in.
#[derive(Debug, Clone, Copy)]
pub struct SortConfig {
    /// Size of one block (page) in bytes.
    pub block_size: usize,
    /// Size of one record in memory, in bytes.
    pub object_size: usize,
    /// Memory available during the open phase, in bytes.
    pub mem_size: usize,
    /// Memory available during the final (online) merge, in bytes.
    pub final_mem_size: usize,
    /// Share of memory for the output buffer during run creation.
    pub first_output_buffer_ratio: f64,
    /// Share of memory for the output buffer during intermediate merges.
    pub output_buffer_ratio: f64,
    /// Share of memory for input buffers during intermediate merges.
    pub input_buffer_ratio: f64,
    /// Share of memory for input buffers during the final merge.
    pub final_input_buffer_ratio: f64,
}

impl SortConfig {
    /// Creates a configuration with all ratios at `0.0` and the default
    /// block size.
    #[must_use]
    pub fn new(object_size: usize, mem_size: usize, final_mem_size: usize) -> Self {
        Self {
            block_size: DEFAULT_BLOCK_SIZE,
            object_size,
            mem_size,
            final_mem_size,
            first_output_buffer_ratio: 0.0,
            output_buffer_ratio: 0.0,
            input_buffer_ratio: 0.0,
            final_input_buffer_ratio: 0.0,
        }
    }

    /// Sets the block size.
    #[must_use]
    pub fn with_block_size(mut self, block_size: usize) -> Self {
        self.block_size = block_size;
        self
    }

    /// Sets the run-creation output buffer ratio.
    #[must_use]
    pub fn with_first_output_buffer_ratio(mut self, ratio: f64) -> Self {
        self.first_output_buffer_ratio = ratio;
        self
    }

    /// Sets the intermediate-merge output buffer ratio.
    #[must_use]
    pub fn with_output_buffer_ratio(mut self, ratio: f64) -> Self {
        self.output_buffer_ratio = ratio;
        self
    }

    /// Sets the intermediate-merge input buffer ratio.
    #[must_use]
    pub fn with_input_buffer_ratio(mut self, ratio: f64) -> Self {
        self.input_buffer_ratio = ratio;
        self
    }

    /// Sets the final-merge input buffer ratio.
    #[must_use]
    pub fn with_final_input_buffer_ratio(mut self, ratio: f64) -> Self {
        self.final_input_buffer_ratio = ratio;
        self
    }

    /// Validates the raw parameters.
    pub fn validate(&self) -> XxlResult<()> {
        if self.block_size == 0 {
            return Err(XxlError::invalid_argument("block size must be positive"));
        }
        if self.object_size == 0 {
            return Err(XxlError::invalid_argument("object size must be positive"));
        }
        for (name, ratio) in [
            ("first_output_buffer_ratio", self.first_output_buffer_ratio),
            ("output_buffer_ratio", self.output_buffer_ratio),
            ("input_buffer_ratio", self.input_buffer_ratio),
            ("final_input_buffer_ratio", self.final_input_buffer_ratio),
        ] {
            if !(0.0..=1.0).contains(&ratio) {
                return Err(XxlError::invalid_argument(format!(
                    "{} must lie in [0, 1], got {}",
                    name, ratio
                )));
            }
        }
        if self.mem_size < self.object_size + 2 * self.block_size {
            return Err(XxlError::invalid_argument(format!(
                "open-phase memory of {} bytes cannot hold a record and two blocks",
                self.mem_size
            )));
        }
        if self.final_mem_size < self.object_size + self.block_size {
            return Err(XxlError::invalid_argument(format!(
                "final-phase memory of {} bytes cannot hold a record and a block",
                self.final_mem_size
            )));
        }
        Ok(())
    }

    /// Derives the memory layout, validating the configuration first.
    pub fn layout(&self) -> XxlResult<SortLayout> {
        self.validate()?;

        let block = self.block_size as i64;
        let object = self.object_size as i64;
        let mem = self.mem_size as i64;
        let final_mem = self.final_mem_size as i64;

        // Each buffer gets at least one block; the ratio share is rounded
        // down to whole blocks.
        let align = |value: i64, ratio: f64| -> i64 {
            (value.max(0) as f64 * ratio) as i64 / block * block + block
        };

        let first_output_buffer_size = align(mem - object - block, self.first_output_buffer_ratio);
        let heap_size = (mem - first_output_buffer_size) / object;

        let output_buffer_size =
            align(mem - block - 2 * (object + block), self.output_buffer_ratio);
        let input_buffer_size = align(
            (mem - output_buffer_size) / 2 - (object + block),
            self.input_buffer_ratio,
        );
        let fan_in = (mem - output_buffer_size) / (input_buffer_size + object);

        let final_input_buffer_size =
            align(final_mem - object - block, self.final_input_buffer_ratio);
        let final_fan_in = final_mem / (final_input_buffer_size + object);

        if heap_size < 1 {
            return Err(XxlError::invalid_argument(
                "memory layout leaves no room for the replacement-selection heap",
            ));
        }
        if fan_in < 2 {
            return Err(XxlError::invalid_argument(
                "memory layout leaves a merge fan-in below 2",
            ));
        }
        if final_fan_in < 1 {
            return Err(XxlError::invalid_argument(
                "memory layout leaves no room for the final merge",
            ));
        }

        Ok(SortLayout {
            block_size: self.block_size,
            object_size: self.object_size,
            mem_size: self.mem_size,
            final_mem_size: self.final_mem_size,
            first_output_buffer_size: first_output_buffer_size as usize,
            heap_size: heap_size as usize,
            output_buffer_size: output_buffer_size as usize,
            input_buffer_size: input_buffer_size as usize,
            fan_in: fan_in as usize,
            final_input_buffer_size: final_input_buffer_size as usize,
            final_fan_in: final_fan_in as usize,
        })
    }
}

/// The derived memory layout of a merge sorter. All buffer sizes are
/// block-aligned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortLayout {
    /// Size of one block in bytes.
    pub block_size: usize,
    /// Size of one record in memory, in bytes.
    pub object_size: usize,
    /// Open-phase memory budget.
    pub mem_size: usize,
    /// Final-phase memory budget.
    pub final_mem_size: usize,
    /// Output buffer size during run creation.
    pub first_output_buffer_size: usize,
    /// Capacity of the replacement-selection heap, in records.
    pub heap_size: usize,
    /// Output buffer size during intermediate merges.
    pub output_buffer_size: usize,
    /// Input buffer size during intermediate merges.
    pub input_buffer_size: usize,
    /// Number of queues merged per intermediate merge.
    pub fan_in: usize,
    /// Input buffer size during the final merge.
    pub final_input_buffer_size: usize,
    /// Number of queues left to the final (online) merge.
    pub final_fan_in: usize,
}

impl SortLayout {
    /// The input buffer size a queue should use right now.
    ///
    /// During intermediate merges the remaining memory is split across the
    /// current fan-in; once the open phase has finished the final-merge
    /// size applies.
    #[must_use]
    pub fn current_input_buffer_size(&self, state: &PhaseState) -> usize {
        if state.open_phase_finished() {
            self.final_input_buffer_size
        } else {
            let fan_in = state.current_fan_in().max(1);
            ((self.mem_size - self.output_buffer_size) / fan_in)
                .saturating_sub(self.object_size)
                / self.block_size
                * self.block_size
        }
    }

    /// The output buffer size a queue should use right now.
    ///
    /// Memory left over after the input-side shares is granted to the
    /// output buffer in whole blocks.
    #[must_use]
    pub fn current_output_buffer_size(&self, state: &PhaseState) -> usize {
        if state.runs_created() {
            let per_input = self.current_input_buffer_size(state) + self.object_size;
            self.output_buffer_size
                + (self.mem_size - self.output_buffer_size) % per_input.max(1)
                    / self.block_size
                    * self.block_size
        } else {
            self.first_output_buffer_size
                + (self.mem_size - self.first_output_buffer_size) % self.object_size
                    / self.block_size
                    * self.block_size
        }
    }
}

/// Live phase flags shared between the sorter and its buffer-size
/// providers.
#[derive(Debug)]
pub struct PhaseState {
    runs_created: Cell<bool>,
    open_phase_finished: Cell<bool>,
    current_fan_in: Cell<usize>,
}

impl PhaseState {
    /// Creates the state for a sorter that has not started yet.
    #[must_use]
    pub fn new(initial_fan_in: usize) -> Self {
        Self {
            runs_created: Cell::new(false),
            open_phase_finished: Cell::new(false),
            current_fan_in: Cell::new(initial_fan_in),
        }
    }

    /// True once all initial runs have been created.
    #[must_use]
    pub fn runs_created(&self) -> bool {
        self.runs_created.get()
    }

    /// Marks run creation as finished.
    pub fn set_runs_created(&self) {
        self.runs_created.set(true);
    }

    /// True once the open phase (all intermediate merges) has finished.
    #[must_use]
    pub fn open_phase_finished(&self) -> bool {
        self.open_phase_finished.get()
    }

    /// Marks the open phase as finished.
    pub fn set_open_phase_finished(&self) {
        self.open_phase_finished.set(true);
    }

    /// The fan-in of the merge currently in progress.
    #[must_use]
    pub fn current_fan_in(&self) -> usize {
        self.current_fan_in.get()
    }

    /// Sets the fan-in of the merge currently in progress.
    pub fn set_current_fan_in(&self, fan_in: usize) {
        self.current_fan_in.set(fan_in);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_layout() {
        // 12-byte records, 12 pages of memory, 4 pages for the final merge.
        let layout = SortConfig::new(12, 12 * 4096, 4 * 4096).layout().unwrap();
        assert_eq!(layout.first_output_buffer_size, 4096);
        assert_eq!(layout.heap_size, 3754);
        assert_eq!(layout.output_buffer_size, 4096);
        assert_eq!(layout.input_buffer_size, 4096);
        assert_eq!(layout.fan_in, 10);
        assert_eq!(layout.final_input_buffer_size, 4096);
        assert_eq!(layout.final_fan_in, 3);
    }

    #[test]
    fn test_ratios_grow_buffers() {
        let base = SortConfig::new(12, 64 * 4096, 16 * 4096).layout().unwrap();
        let wide = SortConfig::new(12, 64 * 4096, 16 * 4096)
            .with_first_output_buffer_ratio(0.5)
            .layout()
            .unwrap();
        assert!(wide.first_output_buffer_size > base.first_output_buffer_size);
        assert!(wide.heap_size < base.heap_size);
    }

    #[test]
    fn test_invalid_configs_rejected() {
        assert!(SortConfig::new(0, 4096, 4096).layout().is_err());
        assert!(SortConfig::new(12, 100, 4096).layout().is_err());
        assert!(SortConfig::new(12, 12 * 4096, 4 * 4096)
            .with_input_buffer_ratio(1.5)
            .layout()
            .is_err());
    }

    #[test]
    fn test_current_sizes_track_phase() {
        let layout = SortConfig::new(12, 12 * 4096, 4 * 4096).layout().unwrap();
        let state = PhaseState::new(layout.fan_in);

        // Intermediate phase with fan-in 10: (49152 - 4096) / 10 = 4505,
        // minus the record and rounded down to blocks = one block.
        state.set_runs_created();
        assert_eq!(layout.current_input_buffer_size(&state), 4096);

        state.set_open_phase_finished();
        assert_eq!(
            layout.current_input_buffer_size(&state),
            layout.final_input_buffer_size
        );
    }
}

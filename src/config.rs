use std::time::Duration;

// a runaway loop is cut off after this many executed statements
pub const DEFAULT_MAX_STEPS: u64 = 1_000_000;

// wall clock budget for one run, in milliseconds
pub const DEFAULT_TIME_LIMIT_MS: u64 = 2_000;

pub const DEFAULT_MAX_CALL_DEPTH: usize = 200;

// host stack reserved per nested call: one call plus the blocks and
// expressions nested inside it
pub const STACK_BYTES_PER_CALL: usize = 256 * 1024;

// upper bound on the stack of the thread a program runs on
pub const MAX_RUN_STACK_BYTES: usize = 1 << 30;

// longest text a concatenation may build, in bytes
pub const MAX_TEXT_BYTES: usize = 1 << 20;

pub const DEFAULT_INDENT_WIDTH: usize = 4;

#[derive(Clone, Debug)]
pub struct RuntimeConfig {
    pub max_steps: u64,
    pub time_limit: Duration,
    pub max_call_depth: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            // set default values here, unless overridden via command-line
            max_steps: DEFAULT_MAX_STEPS,
            time_limit: Duration::from_millis(DEFAULT_TIME_LIMIT_MS),
            max_call_depth: DEFAULT_MAX_CALL_DEPTH,
        }
    }
}

impl RuntimeConfig {
    /// Stack size of the thread a program runs on, enough for
    /// `max_call_depth` nested calls up to `MAX_RUN_STACK_BYTES`.
    pub fn run_stack_size(&self) -> usize {
        STACK_BYTES_PER_CALL
            .saturating_mul(self.max_call_depth.saturating_add(1))
            .min(MAX_RUN_STACK_BYTES)
    }

    /// Call depth actually enforced: `max_call_depth`, lowered when the
    /// capped stack could not hold that many calls.
    pub fn effective_call_depth(&self) -> usize {
        let supported = self.run_stack_size() / STACK_BYTES_PER_CALL - 1;
        self.max_call_depth.min(supported)
    }
}

#[derive(Clone, Debug)]
pub struct CodegenConfig {
    pub indent_width: usize,
}

impl Default for CodegenConfig {
    fn default() -> Self {
        Self {
            indent_width: DEFAULT_INDENT_WIDTH,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stack_grows_with_the_call_depth() {
        let config = RuntimeConfig::default();
        assert_eq!(
            config.run_stack_size(),
            STACK_BYTES_PER_CALL * (DEFAULT_MAX_CALL_DEPTH + 1)
        );
        assert_eq!(config.effective_call_depth(), DEFAULT_MAX_CALL_DEPTH);
    }

    #[test]
    fn huge_call_depths_are_capped_by_the_stack() {
        let config = RuntimeConfig {
            max_call_depth: usize::MAX,
            ..RuntimeConfig::default()
        };
        assert_eq!(config.run_stack_size(), MAX_RUN_STACK_BYTES);
        assert_eq!(
            config.effective_call_depth(),
            MAX_RUN_STACK_BYTES / STACK_BYTES_PER_CALL - 1
        );
    }
}

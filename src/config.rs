/// Knobs that shape the produced image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Size of the hub memory image; the stack budget is checked only for 32K.
    pub memory_size: usize,
    pub eliminate_duplicates: bool,
    /// Upper bound on assign/resolve rounds per method.
    pub fixup_iteration_limit: usize,
    /// Cog limit used by `FIT` without an operand.
    pub fit_limit: i32,
    /// Stack longs reserved when `_STACK` is not defined.
    pub default_stack_longs: i32,
}

pub const DEFAULT_MEMORY_SIZE: usize = 32768;

impl Default for Config {
    fn default() -> Self {
        Self {
            memory_size: DEFAULT_MEMORY_SIZE,
            eliminate_duplicates: true,
            fixup_iteration_limit: 64,
            fit_limit: 496,
            default_stack_longs: 16,
        }
    }
}

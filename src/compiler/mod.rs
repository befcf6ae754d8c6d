//! 编译模块：将规则的触发字符串编译为可执行的正则模式
pub mod pattern;
pub mod compiler;

pub use self::pattern::{CompileOutcome, CompileStats, CompiledTrigger};
pub use self::compiler::TriggerCompiler;

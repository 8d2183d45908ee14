//! State shared by every function of one compilation.

use super::pool::StringPool;
use crate::ir::Intrinsic;
use std::collections::BTreeSet;

/// Append-only program-wide state, threaded through the pipeline by `&mut`.
#[derive(Debug, Default)]
pub struct CompileContext {
    pool: StringPool,
    used_intrinsics: BTreeSet<Intrinsic>,
}

impl CompileContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Intern a string literal; returns its pool ordinal.
    pub fn intern(&mut self, s: &str) -> usize {
        self.pool.add(s)
    }

    pub fn pool(&self) -> &StringPool {
        &self.pool
    }

    pub fn pool_mut(&mut self) -> &mut StringPool {
        &mut self.pool
    }

    pub fn note_intrinsic(&mut self, intrinsic: Intrinsic) {
        self.used_intrinsics.insert(intrinsic);
    }

    pub fn uses_intrinsic(&self, intrinsic: Intrinsic) -> bool {
        self.used_intrinsics.contains(&intrinsic)
    }

    /// Referenced intrinsics in emission order.
    pub fn used_intrinsics(&self) -> Vec<Intrinsic> {
        Intrinsic::ALL
            .into_iter()
            .filter(|i| self.used_intrinsics.contains(i))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interned_strings_and_intrinsics_accumulate() {
        let mut ctx = CompileContext::new();
        assert_eq!(ctx.intern("hi"), 0);
        assert_eq!(ctx.intern("yo"), 1);
        assert_eq!(ctx.intern("hi"), 0);
        assert_eq!(ctx.pool().len(), 2);

        ctx.note_intrinsic(Intrinsic::Halt);
        ctx.note_intrinsic(Intrinsic::Allocate);
        assert!(ctx.uses_intrinsic(Intrinsic::Halt));
        assert_eq!(ctx.used_intrinsics(), vec![Intrinsic::Allocate, Intrinsic::Halt]);
    }
}

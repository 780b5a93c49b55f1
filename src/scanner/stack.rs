use std::fmt;

use crate::grammars::{HookData, ModeId, ROOT_MODE_ID};

#[derive(Clone, Debug)]
pub struct Frame {
    pub mode: ModeId,
    /// Whatever the begin hooks stored for the end hook of this activation
    pub data: HookData,
}

/// The active modes, from the grammar root to the current one.
/// The root is always there.
#[derive(Clone)]
pub struct ModeStack {
    frames: Vec<Frame>,
}

impl Default for ModeStack {
    fn default() -> Self {
        Self {
            frames: vec![Frame {
                mode: ROOT_MODE_ID,
                data: HookData::default(),
            }],
        }
    }
}

impl ModeStack {
    pub fn push(&mut self, mode: ModeId, data: HookData) {
        self.frames.push(Frame { mode, data });
    }

    /// Pops the top frame, unless it's the root
    pub fn pop(&mut self) -> Option<Frame> {
        if self.frames.len() > 1 {
            self.frames.pop()
        } else {
            None
        }
    }

    pub fn top(&self) -> &Frame {
        // the root is never popped
        &self.frames[self.frames.len() - 1]
    }

    pub fn get(&self, depth: usize) -> &Frame {
        &self.frames[depth]
    }

    pub fn get_mut(&mut self, depth: usize) -> &mut Frame {
        &mut self.frames[depth]
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    /// All frames above the root, outermost first
    pub fn nested(&self) -> &[Frame] {
        &self.frames[1..]
    }
}

impl fmt::Debug for ModeStack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let modes: Vec<u16> = self.frames.iter().map(|frame| *frame.mode).collect();
        write!(f, "ModeStack({modes:?})")
    }
}

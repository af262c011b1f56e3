use crate::ir::spaces;
use crate::ir::Block;
use crate::ir::Op;
use crate::shared::Shared;
use crate::shared::SharedExt;
use std::fmt::Formatter;

/// A list of blocks that is owned by an op.
#[derive(Default)]
pub struct Region {
    blocks: Vec<Shared<Block>>,
    parent: Option<Shared<dyn Op>>,
}

impl Region {
    pub fn blocks(&self) -> Vec<Shared<Block>> {
        self.blocks.clone()
    }
    /// The entry block of the region.
    pub fn block(&self) -> Option<Shared<Block>> {
        self.blocks.first().cloned()
    }
    pub fn add_block(&mut self, block: Shared<Block>) {
        self.blocks.push(block);
    }
    pub fn parent(&self) -> Option<Shared<dyn Op>> {
        self.parent.clone()
    }
    pub fn set_parent(&mut self, parent: Option<Shared<dyn Op>>) {
        self.parent = parent;
    }
    /// Return the ops of all blocks in this region.
    pub fn ops(&self) -> Vec<Shared<dyn Op>> {
        let mut result = vec![];
        for block in self.blocks.iter() {
            result.extend(block.rd().ops().rd().iter().cloned());
        }
        result
    }
    pub fn display(&self, f: &mut Formatter<'_>, indent: i32) -> std::fmt::Result {
        writeln!(f, "{{")?;
        for block in self.blocks.iter() {
            block.rd().display(f, indent + 1)?;
        }
        write!(f, "{}}}", spaces(indent))
    }
}

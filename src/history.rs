//! Undoable diagram edits.
//!
//! Each edit function performs one change on a [`Diagram`] and returns the
//! [`EditCommand`] that records it. [`EditHistory`] stores those commands and
//! replays them backwards (undo) or forwards (redo).
//!
//! ```rust,ignore
//! let mut history = EditHistory::new(100);
//! let (gain, cmd) = add_block(&mut diagram, BlockKind::gain(2.0))?;
//! history.push(cmd);
//! history.undo(&mut diagram); // gain is gone
//! history.redo(&mut diagram); // gain is back, same id
//! ```

use crate::block::{Block, BlockId, BlockKind};
use crate::diagram::{Connection, ConnectionId, Diagram, PortRef, RemovedBlock};
use crate::error::GraphError;

/// A single recorded edit, with enough state to reverse it.
#[derive(Debug, Clone, PartialEq)]
pub enum EditCommand {
    AddBlock { block: Block },
    RemoveBlock { removed: RemovedBlock },
    AddConnection { connection: Connection },
    RemoveConnection { connection: Connection },
    /// Rename or parameter change; the variant of the kind never changes.
    UpdateBlock { before: Block, after: Block },
    Clear {
        blocks: Vec<Block>,
        connections: Vec<Connection>,
    },
    Batch(Vec<EditCommand>),
}

impl EditCommand {
    /// Perform the edit (again).
    fn apply(&self, diagram: &mut Diagram) -> Result<(), GraphError> {
        match self {
            EditCommand::AddBlock { block } => diagram.insert_block(block.clone()),
            EditCommand::RemoveBlock { removed } => diagram.remove_block(removed.block.id).map(drop),
            EditCommand::AddConnection { connection } => diagram.insert_connection(*connection),
            EditCommand::RemoveConnection { connection } => {
                diagram.remove_connection(connection.id).map(drop)
            }
            EditCommand::UpdateBlock { after, .. } => diagram.replace_block(after.clone()),
            EditCommand::Clear { .. } => {
                diagram.clear();
                Ok(())
            }
            EditCommand::Batch(cmds) => cmds.iter().try_for_each(|c| c.apply(diagram)),
        }
    }

    /// Reverse the edit.
    fn revert(&self, diagram: &mut Diagram) -> Result<(), GraphError> {
        match self {
            EditCommand::AddBlock { block } => diagram.remove_block(block.id).map(drop),
            EditCommand::RemoveBlock { removed } => {
                diagram.insert_block(removed.block.clone())?;
                removed
                    .connections
                    .iter()
                    .try_for_each(|c| diagram.insert_connection(*c))
            }
            EditCommand::AddConnection { connection } => {
                diagram.remove_connection(connection.id).map(drop)
            }
            EditCommand::RemoveConnection { connection } => diagram.insert_connection(*connection),
            EditCommand::UpdateBlock { before, .. } => diagram.replace_block(before.clone()),
            EditCommand::Clear {
                blocks,
                connections,
            } => {
                for b in blocks {
                    diagram.insert_block(b.clone())?;
                }
                connections
                    .iter()
                    .try_for_each(|c| diagram.insert_connection(*c))
            }
            EditCommand::Batch(cmds) => cmds.iter().rev().try_for_each(|c| c.revert(diagram)),
        }
    }
}

/// Bounded undo/redo stacks.
#[derive(Debug, Clone)]
pub struct EditHistory {
    undo_stack: Vec<EditCommand>,
    redo_stack: Vec<EditCommand>,
    max_size: usize,
}

impl EditHistory {
    /// Create a new history with the given maximum undo depth.
    pub fn new(max_size: usize) -> Self {
        Self {
            undo_stack: Vec::new(),
            redo_stack: Vec::new(),
            max_size,
        }
    }

    /// Record a performed edit and clear the redo stack.
    pub fn push(&mut self, cmd: EditCommand) {
        self.undo_stack.push(cmd);
        self.redo_stack.clear();
        if self.undo_stack.len() > self.max_size {
            self.undo_stack.remove(0);
        }
    }

    /// Undo the last edit, returning true if one was undone.
    ///
    /// If the edit no longer fits the diagram (say a restored connection
    /// would land on an input that has since been wired), the diagram is
    /// left as it was and the entry stays on the undo stack.
    pub fn undo(&mut self, diagram: &mut Diagram) -> bool {
        let Some(cmd) = self.undo_stack.pop() else {
            return false;
        };
        match all_or_nothing(diagram, |d| cmd.revert(d)) {
            Ok(()) => {
                self.redo_stack.push(cmd);
                true
            }
            Err(err) => {
                log::warn!("cannot undo: {}", err);
                self.undo_stack.push(cmd);
                false
            }
        }
    }

    /// Redo the last undone edit, returning true if one was redone. Fails
    /// the same way as [`EditHistory::undo`].
    pub fn redo(&mut self, diagram: &mut Diagram) -> bool {
        let Some(cmd) = self.redo_stack.pop() else {
            return false;
        };
        match all_or_nothing(diagram, |d| cmd.apply(d)) {
            Ok(()) => {
                self.undo_stack.push(cmd);
                true
            }
            Err(err) => {
                log::warn!("cannot redo: {}", err);
                self.redo_stack.push(cmd);
                false
            }
        }
    }

    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    pub fn clear(&mut self) {
        self.undo_stack.clear();
        self.redo_stack.clear();
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Recorded edits
// ────────────────────────────────────────────────────────────────────────────

pub fn add_block(
    diagram: &mut Diagram,
    kind: BlockKind,
) -> Result<(BlockId, EditCommand), GraphError> {
    let id = diagram.try_add_block(kind)?;
    let block = diagram.block(id).cloned().ok_or(GraphError::UnknownBlock(id))?;
    Ok((id, EditCommand::AddBlock { block }))
}

pub fn remove_block(diagram: &mut Diagram, id: BlockId) -> Result<EditCommand, GraphError> {
    let removed = diagram.remove_block(id)?;
    Ok(EditCommand::RemoveBlock { removed })
}

pub fn add_connection(
    diagram: &mut Diagram,
    source: PortRef,
    target: PortRef,
) -> Result<(ConnectionId, EditCommand), GraphError> {
    let id = diagram.add_connection(source, target)?;
    let connection = Connection { id, source, target };
    Ok((id, EditCommand::AddConnection { connection }))
}

pub fn remove_connection(diagram: &mut Diagram, id: ConnectionId) -> Result<EditCommand, GraphError> {
    let connection = diagram.remove_connection(id)?;
    Ok(EditCommand::RemoveConnection { connection })
}

pub fn rename_block(
    diagram: &mut Diagram,
    id: BlockId,
    name: &str,
) -> Result<EditCommand, GraphError> {
    update_block(diagram, id, |d| d.rename_block(id, name))
}

pub fn set_gain(diagram: &mut Diagram, id: BlockId, value: f64) -> Result<EditCommand, GraphError> {
    update_block(diagram, id, |d| d.set_gain(id, value))
}

pub fn set_transfer_function_expr(
    diagram: &mut Diagram,
    id: BlockId,
    text: &str,
) -> Result<EditCommand, GraphError> {
    update_block(diagram, id, |d| d.set_transfer_function_expr(id, text))
}

/// "New diagram".
pub fn clear(diagram: &mut Diagram) -> EditCommand {
    let blocks = diagram.blocks().cloned().collect();
    let connections = diagram.connections().copied().collect();
    diagram.clear();
    EditCommand::Clear {
        blocks,
        connections,
    }
}

/// Run a multi-step change on a copy and keep it only if every step succeeds.
fn all_or_nothing(
    diagram: &mut Diagram,
    change: impl FnOnce(&mut Diagram) -> Result<(), GraphError>,
) -> Result<(), GraphError> {
    let mut scratch = diagram.clone();
    change(&mut scratch)?;
    *diagram = scratch;
    Ok(())
}

fn update_block(
    diagram: &mut Diagram,
    id: BlockId,
    edit: impl FnOnce(&mut Diagram) -> Result<(), GraphError>,
) -> Result<EditCommand, GraphError> {
    let before = diagram.block(id).cloned().ok_or(GraphError::UnknownBlock(id))?;
    edit(diagram)?;
    let after = diagram.block(id).cloned().ok_or(GraphError::UnknownBlock(id))?;
    Ok(EditCommand::UpdateBlock { before, after })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_history_new() {
        let history = EditHistory::new(10);
        assert!(!history.can_undo());
        assert!(!history.can_redo());
    }

    #[test]
    fn test_undo_redo_add_block() {
        let mut d = Diagram::new();
        let mut h = EditHistory::new(10);
        let (id, cmd) = add_block(&mut d, BlockKind::Integrator).unwrap();
        h.push(cmd);

        assert!(h.undo(&mut d));
        assert!(d.block(id).is_none());
        assert!(h.redo(&mut d));
        assert_eq!(d.block(id).unwrap().kind, BlockKind::Integrator);
        assert!(!h.redo(&mut d));
    }

    #[test]
    fn test_undo_remove_block_restores_connections() {
        let mut d = Diagram::new();
        let u = d.add_block(BlockKind::Input);
        let g = d.add_block(BlockKind::gain(3.0));
        let y = d.add_block(BlockKind::Output);
        d.connect(u, g, 0).unwrap();
        d.connect(g, y, 0).unwrap();

        let mut h = EditHistory::new(10);
        h.push(remove_block(&mut d, g).unwrap());
        assert_eq!(d.connection_count(), 0);

        assert!(h.undo(&mut d));
        assert_eq!(d.connection_count(), 2);
        assert_eq!(d.predecessors(y), vec![g]);
    }

    #[test]
    fn test_conflicting_undo_leaves_diagram_untouched() {
        let mut d = Diagram::new();
        let u = d.add_block(BlockKind::Input);
        let g = d.add_block(BlockKind::gain(3.0));
        let y = d.add_block(BlockKind::Output);
        d.connect(u, g, 0).unwrap();
        d.connect(g, y, 0).unwrap();

        let mut h = EditHistory::new(10);
        h.push(remove_block(&mut d, g).unwrap());
        let bypass = d.connect(u, y, 0).unwrap();

        // g -> y cannot come back while u -> y occupies the input.
        assert!(!h.undo(&mut d));
        assert!(d.block(g).is_none());
        assert_eq!(d.block_count(), 2);
        assert_eq!(d.connection_count(), 1);
        assert_eq!(d.predecessors(y), vec![u]);
        assert!(h.can_undo());

        d.remove_connection(bypass).unwrap();
        assert!(h.undo(&mut d));
        assert_eq!(d.connection_count(), 2);
        assert_eq!(d.predecessors(y), vec![g]);
    }

    #[test]
    fn test_undo_parameter_edit() {
        let mut d = Diagram::new();
        let g = d.add_block(BlockKind::gain(1.0));
        let mut h = EditHistory::new(10);
        h.push(set_gain(&mut d, g, 4.0).unwrap());
        h.push(rename_block(&mut d, g, "K").unwrap());

        assert!(h.undo(&mut d));
        assert_eq!(d.block(g).unwrap().name, "gain_0");
        assert!(h.undo(&mut d));
        assert_eq!(d.block(g).unwrap().kind, BlockKind::gain(1.0));
    }

    #[test]
    fn test_failed_edit_records_nothing() {
        let mut d = Diagram::new();
        let tf = d.add_block(BlockKind::default_transfer_function());
        assert!(set_transfer_function_expr(&mut d, tf, "1/(s+").is_err());
        assert_eq!(d.block(tf).unwrap().kind, BlockKind::default_transfer_function());
    }

    #[test]
    fn test_undo_clear() {
        let mut d = Diagram::new();
        let u = d.add_block(BlockKind::Input);
        let y = d.add_block(BlockKind::Output);
        d.connect(u, y, 0).unwrap();

        let mut h = EditHistory::new(10);
        h.push(clear(&mut d));
        assert!(d.is_empty());
        assert!(h.undo(&mut d));
        assert_eq!(d.block_count(), 2);
        assert_eq!(d.connection_count(), 1);
    }

    #[test]
    fn test_max_size() {
        let mut d = Diagram::new();
        let mut h = EditHistory::new(2);
        for _ in 0..3 {
            let (_, cmd) = add_block(&mut d, BlockKind::Sum).unwrap();
            h.push(cmd);
        }
        assert!(h.undo(&mut d));
        assert!(h.undo(&mut d));
        assert!(!h.undo(&mut d));
        assert_eq!(d.block_count(), 1);
    }

    #[test]
    fn test_batch_reverts_in_reverse_order() {
        let mut d = Diagram::new();
        let (u, c1) = add_block(&mut d, BlockKind::Input).unwrap();
        let (y, c2) = add_block(&mut d, BlockKind::Output).unwrap();
        let (_, c3) = add_connection(&mut d, PortRef::output(u, 0), PortRef::input(y, 0)).unwrap();

        let mut h = EditHistory::new(10);
        h.push(EditCommand::Batch(vec![c1, c2, c3]));
        assert!(h.undo(&mut d));
        assert!(d.is_empty());
        assert!(h.redo(&mut d));
        assert_eq!(d.connection_count(), 1);
    }
}

//! The diagram graph: an arena of blocks and connections.
//!
//! Blocks and connections are keyed by stable ids. A connection is stored as
//! `(source block, source port, destination block, destination port)`;
//! adjacency is always computed from the connection arena, so there are no
//! back-pointer lists to keep in sync. Every edit either succeeds completely
//! or returns an error with the diagram unchanged.

use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::block::{Block, BlockId, BlockKind};
use crate::error::{ConnectionRejection, GraphError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(pub u32);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "c{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PortDirection {
    Input,
    Output,
}

/// A port, identified by its owning block, direction and position among the
/// block's ports of that direction (0-based).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PortRef {
    pub block: BlockId,
    pub direction: PortDirection,
    pub index: u32,
}

impl PortRef {
    pub fn output(block: BlockId, index: u32) -> Self {
        Self {
            block,
            direction: PortDirection::Output,
            index,
        }
    }

    pub fn input(block: BlockId, index: u32) -> Self {
        Self {
            block,
            direction: PortDirection::Input,
            index,
        }
    }
}

/// A directed edge from an output port to an input port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Connection {
    pub id: ConnectionId,
    pub source: PortRef,
    pub target: PortRef,
}

/// A block removed from the diagram together with the connections that went
/// with it.
#[derive(Debug, Clone, PartialEq)]
pub struct RemovedBlock {
    pub block: Block,
    pub connections: Vec<Connection>,
}

/// Blocks and connections of one block diagram.
#[derive(Debug, Clone, Default)]
pub struct Diagram {
    blocks: IndexMap<BlockId, Block>,
    connections: IndexMap<ConnectionId, Connection>,
    next_block: u32,
    next_connection: u32,
}

impl Diagram {
    pub fn new() -> Self {
        Self::default()
    }

    // ── Edits ──────────────────────────────────────────────────────────────

    /// Add a block named `<tag>_<n>`.
    ///
    /// # Panics
    ///
    /// If every block id has been handed out; see [`Diagram::try_add_block`].
    pub fn add_block(&mut self, kind: BlockKind) -> BlockId {
        let name = format!("{}_{}", kind.tag(), self.next_block);
        self.add_named_block(kind, name)
    }

    /// # Panics
    ///
    /// If every block id has been handed out.
    pub fn add_named_block(&mut self, kind: BlockKind, name: impl Into<String>) -> BlockId {
        match self.try_add_named_block(kind, name) {
            Ok(id) => id,
            Err(err) => panic!("{err}"),
        }
    }

    pub fn try_add_block(&mut self, kind: BlockKind) -> Result<BlockId, GraphError> {
        let name = format!("{}_{}", kind.tag(), self.next_block);
        self.try_add_named_block(kind, name)
    }

    /// Add a block, failing once the id space is used up.
    pub fn try_add_named_block(
        &mut self,
        kind: BlockKind,
        name: impl Into<String>,
    ) -> Result<BlockId, GraphError> {
        let id = BlockId(self.next_block);
        self.next_block = following(self.next_block, "block")?;
        self.blocks.insert(id, Block::new(id, kind, name));
        Ok(id)
    }

    /// Remove a block and every connection touching it.
    pub fn remove_block(&mut self, id: BlockId) -> Result<RemovedBlock, GraphError> {
        let block = self
            .blocks
            .shift_remove(&id)
            .ok_or(GraphError::UnknownBlock(id))?;
        let touching: Vec<ConnectionId> = self
            .connections
            .values()
            .filter(|c| c.source.block == id || c.target.block == id)
            .map(|c| c.id)
            .collect();
        let connections = touching
            .iter()
            .filter_map(|cid| self.connections.shift_remove(cid))
            .collect();
        Ok(RemovedBlock { block, connections })
    }

    /// Connect an output port to an input port.
    pub fn add_connection(
        &mut self,
        source: PortRef,
        target: PortRef,
    ) -> Result<ConnectionId, GraphError> {
        self.validate_connection(&source, &target)?;
        let id = ConnectionId(self.next_connection);
        self.next_connection = following(self.next_connection, "connection")?;
        self.connections.insert(id, Connection { id, source, target });
        Ok(id)
    }

    /// Shorthand for `add_connection(output(from, 0), input(to, port))`.
    pub fn connect(&mut self, from: BlockId, to: BlockId, port: u32) -> Result<ConnectionId, GraphError> {
        self.add_connection(PortRef::output(from, 0), PortRef::input(to, port))
    }

    pub fn remove_connection(&mut self, id: ConnectionId) -> Result<Connection, GraphError> {
        self.connections
            .shift_remove(&id)
            .ok_or(GraphError::UnknownConnection(id))
    }

    /// Remove everything. Ids are not reused afterwards.
    pub fn clear(&mut self) {
        self.blocks.clear();
        self.connections.clear();
    }

    pub fn rename_block(&mut self, id: BlockId, name: impl Into<String>) -> Result<(), GraphError> {
        let block = self.blocks.get_mut(&id).ok_or(GraphError::UnknownBlock(id))?;
        block.name = name.into();
        Ok(())
    }

    pub fn set_gain(&mut self, id: BlockId, value: f64) -> Result<(), GraphError> {
        self.replace_kind(id, BlockKind::gain(value), "set gain")
    }

    /// Set a custom block's coefficients; rejected if they do not form a
    /// valid ratio.
    pub fn set_transfer_function(
        &mut self,
        id: BlockId,
        numerator: Vec<f64>,
        denominator: Vec<f64>,
    ) -> Result<(), GraphError> {
        crate::rational::RationalFunction::from_coefficients(&numerator, &denominator)?;
        self.replace_kind(
            id,
            BlockKind::transfer_function(numerator, denominator),
            "set transfer function",
        )
    }

    /// Set a custom block from text such as `5/(s^2 + 5)`.
    pub fn set_transfer_function_expr(&mut self, id: BlockId, text: &str) -> Result<(), GraphError> {
        self.check_kind(id, &BlockKind::default_transfer_function(), "set transfer function")?;
        let kind = BlockKind::transfer_function_from_expr(text)?;
        self.replace_kind(id, kind, "set transfer function")
    }

    fn check_kind(&self, id: BlockId, wanted: &BlockKind, action: &'static str) -> Result<(), GraphError> {
        let block = self.blocks.get(&id).ok_or(GraphError::UnknownBlock(id))?;
        if !block.kind.same_variant(wanted) {
            return Err(GraphError::InvalidEdit {
                block: id,
                kind: block.kind.tag(),
                action,
            });
        }
        Ok(())
    }

    fn replace_kind(&mut self, id: BlockId, kind: BlockKind, action: &'static str) -> Result<(), GraphError> {
        self.check_kind(id, &kind, action)?;
        if let Some(block) = self.blocks.get_mut(&id) {
            block.kind = kind;
        }
        Ok(())
    }

    // ── Restoration (undo, document loading) ───────────────────────────────

    /// Insert a block with its existing id.
    pub(crate) fn insert_block(&mut self, block: Block) -> Result<(), GraphError> {
        if self.blocks.contains_key(&block.id) {
            return Err(GraphError::DuplicateId(block.id.to_string()));
        }
        self.next_block = self.next_block.max(following(block.id.0, "block")?);
        self.blocks.insert(block.id, block);
        Ok(())
    }

    /// Insert a connection with its existing id, applying the usual checks.
    pub(crate) fn insert_connection(&mut self, connection: Connection) -> Result<(), GraphError> {
        if self.connections.contains_key(&connection.id) {
            return Err(GraphError::DuplicateId(connection.id.to_string()));
        }
        self.validate_connection(&connection.source, &connection.target)?;
        self.next_connection = self
            .next_connection
            .max(following(connection.id.0, "connection")?);
        self.connections.insert(connection.id, connection);
        Ok(())
    }

    /// Overwrite the stored block that has `block.id`.
    pub(crate) fn replace_block(&mut self, block: Block) -> Result<(), GraphError> {
        let slot = self
            .blocks
            .get_mut(&block.id)
            .ok_or(GraphError::UnknownBlock(block.id))?;
        *slot = block;
        Ok(())
    }

    fn validate_connection(&self, source: &PortRef, target: &PortRef) -> Result<(), GraphError> {
        use ConnectionRejection::*;
        let src_block = self
            .blocks
            .get(&source.block)
            .ok_or(GraphError::UnknownBlock(source.block))?;
        let dst_block = self
            .blocks
            .get(&target.block)
            .ok_or(GraphError::UnknownBlock(target.block))?;
        if source.direction != PortDirection::Output {
            return Err(GraphError::rejected(SourceNotOutput));
        }
        if target.direction != PortDirection::Input {
            return Err(GraphError::rejected(TargetNotInput));
        }
        if source.block == target.block {
            return Err(GraphError::rejected(SelfLoop));
        }
        if source.index as usize >= src_block.kind.output_arity()
            || target.index as usize >= dst_block.kind.input_arity()
        {
            return Err(GraphError::rejected(NoSuchPort));
        }
        let mut into_target = self.connections.values().filter(|c| c.target == *target);
        if let Some(existing) = into_target.next() {
            return Err(GraphError::rejected(if existing.source == *source {
                Duplicate
            } else {
                TargetOccupied
            }));
        }
        Ok(())
    }

    // ── Queries ────────────────────────────────────────────────────────────

    pub fn block(&self, id: BlockId) -> Option<&Block> {
        self.blocks.get(&id)
    }

    pub fn connection(&self, id: ConnectionId) -> Option<&Connection> {
        self.connections.get(&id)
    }

    pub fn blocks(&self) -> impl Iterator<Item = &Block> {
        self.blocks.values()
    }

    pub fn connections(&self) -> impl Iterator<Item = &Connection> {
        self.connections.values()
    }

    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Input blocks, in insertion order.
    pub fn sources(&self) -> Vec<BlockId> {
        self.ids_where(|b| b.kind == BlockKind::Input)
    }

    /// Output blocks, in insertion order.
    pub fn sinks(&self) -> Vec<BlockId> {
        self.ids_where(|b| b.kind == BlockKind::Output)
    }

    fn ids_where(&self, pred: impl Fn(&Block) -> bool) -> Vec<BlockId> {
        self.blocks.values().filter(|b| pred(b)).map(|b| b.id).collect()
    }

    /// The connection feeding input port `port` of `block`, if any.
    pub fn input_connection(&self, block: BlockId, port: u32) -> Option<&Connection> {
        let target = PortRef::input(block, port);
        self.connections.values().find(|c| c.target == target)
    }

    /// One entry per input port of `block`, in port order.
    pub fn incoming(&self, block: BlockId) -> Vec<Option<&Connection>> {
        let arity = self.blocks.get(&block).map_or(0, |b| b.kind.input_arity());
        (0..arity as u32)
            .map(|port| self.input_connection(block, port))
            .collect()
    }

    pub fn outgoing(&self, block: BlockId) -> Vec<&Connection> {
        self.connections
            .values()
            .filter(|c| c.source.block == block)
            .collect()
    }

    /// Blocks fed by `block`, without duplicates.
    pub fn successors(&self, block: BlockId) -> Vec<BlockId> {
        let mut out: Vec<BlockId> = Vec::new();
        for c in self.outgoing(block) {
            if !out.contains(&c.target.block) {
                out.push(c.target.block);
            }
        }
        out
    }

    /// Blocks feeding `block`, without duplicates.
    pub fn predecessors(&self, block: BlockId) -> Vec<BlockId> {
        let mut out: Vec<BlockId> = Vec::new();
        for c in self.incoming(block).into_iter().flatten() {
            if !out.contains(&c.source.block) {
                out.push(c.source.block);
            }
        }
        out
    }
}

/// The id after `id`. `u32::MAX` has none, so it is never stored.
fn following(id: u32, what: &'static str) -> Result<u32, GraphError> {
    id.checked_add(1).ok_or(GraphError::IdExhausted(what))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain() -> (Diagram, BlockId, BlockId, BlockId) {
        let mut d = Diagram::new();
        let u = d.add_block(BlockKind::Input);
        let g = d.add_block(BlockKind::gain(2.0));
        let y = d.add_block(BlockKind::Output);
        d.connect(u, g, 0).unwrap();
        d.connect(g, y, 0).unwrap();
        (d, u, g, y)
    }

    #[test]
    fn test_id_space_exhaustion_is_an_error() {
        let mut d = Diagram::new();
        d.insert_block(Block::new(BlockId(u32::MAX - 1), BlockKind::Input, "u"))
            .unwrap();
        assert_eq!(
            d.try_add_block(BlockKind::Output),
            Err(GraphError::IdExhausted("block"))
        );
        assert_eq!(
            d.insert_block(Block::new(BlockId(u32::MAX), BlockKind::Output, "y")),
            Err(GraphError::IdExhausted("block"))
        );
        assert_eq!(d.block_count(), 1);
    }

    #[test]
    fn test_default_names() {
        let (d, u, g, _) = chain();
        assert_eq!(d.block(u).unwrap().name, "input_0");
        assert_eq!(d.block(g).unwrap().name, "gain_1");
    }

    #[test]
    fn test_sources_and_sinks() {
        let (mut d, u, _, y) = chain();
        d.add_block(BlockKind::gain(5.0));
        assert_eq!(d.sources(), vec![u]);
        assert_eq!(d.sinks(), vec![y]);
    }

    #[test]
    fn test_adjacency() {
        let (d, u, g, y) = chain();
        assert_eq!(d.successors(u), vec![g]);
        assert_eq!(d.predecessors(y), vec![g]);
        assert!(d.predecessors(u).is_empty());
        assert_eq!(d.incoming(g).len(), 1);
    }

    #[test]
    fn test_rejections_leave_graph_unchanged() {
        let (mut d, u, g, y) = chain();
        let sum = d.add_block(BlockKind::Sum);
        let before = d.connection_count();

        let cases = [
            (PortRef::input(u, 0), PortRef::input(sum, 0), ConnectionRejection::SourceNotOutput),
            (PortRef::output(u, 0), PortRef::output(sum, 0), ConnectionRejection::TargetNotInput),
            (PortRef::output(sum, 0), PortRef::input(sum, 1), ConnectionRejection::SelfLoop),
            (PortRef::output(u, 0), PortRef::input(sum, 2), ConnectionRejection::NoSuchPort),
            (PortRef::output(sum, 0), PortRef::input(g, 0), ConnectionRejection::TargetOccupied),
            (PortRef::output(u, 0), PortRef::input(g, 0), ConnectionRejection::Duplicate),
        ];
        for (src, dst, reason) in cases {
            assert_eq!(
                d.add_connection(src, dst),
                Err(GraphError::InvalidConnection { reason })
            );
        }
        assert_eq!(d.connection_count(), before);
        assert!(d.add_connection(PortRef::output(y, 0), PortRef::input(sum, 0)).is_err());
    }

    #[test]
    fn test_fan_out_allowed() {
        let (mut d, u, _, _) = chain();
        let sum = d.add_block(BlockKind::Sum);
        d.connect(u, sum, 0).unwrap();
        d.connect(u, sum, 1).unwrap();
        assert_eq!(d.outgoing(u).len(), 3);
        assert_eq!(d.predecessors(sum), vec![u]);
    }

    #[test]
    fn test_remove_block_cascades() {
        let (mut d, _, g, _) = chain();
        let removed = d.remove_block(g).unwrap();
        assert_eq!(removed.connections.len(), 2);
        assert_eq!(d.connection_count(), 0);
        assert_eq!(d.remove_block(g), Err(GraphError::UnknownBlock(g)));
    }

    #[test]
    fn test_parameter_edits() {
        let (mut d, u, g, _) = chain();
        d.set_gain(g, 7.5).unwrap();
        assert_eq!(d.block(g).unwrap().kind, BlockKind::gain(7.5));
        assert!(matches!(d.set_gain(u, 1.0), Err(GraphError::InvalidEdit { .. })));

        let tf = d.add_block(BlockKind::default_transfer_function());
        assert!(matches!(
            d.set_transfer_function_expr(tf, "1/(s - s)"),
            Err(GraphError::Parse(_))
        ));
        assert_eq!(d.block(tf).unwrap().kind, BlockKind::default_transfer_function());
        d.set_transfer_function_expr(tf, "5/(s^2 + 5)").unwrap();
        assert_eq!(
            d.block(tf).unwrap().kind,
            BlockKind::transfer_function(vec![5.0], vec![1.0, 0.0, 5.0])
        );
        assert!(d.set_transfer_function(tf, vec![1.0], vec![0.0]).is_err());
    }

    #[test]
    fn test_clear_does_not_reuse_ids() {
        let (mut d, _, _, y) = chain();
        d.clear();
        assert!(d.is_empty());
        let next = d.add_block(BlockKind::Input);
        assert!(next > y);
    }
}

//! Saving and loading diagrams.
//!
//! [`DiagramDoc`] is the serde form of a [`Diagram`]. It is written either as
//! JSON or as a binary file: `TFDIAGRAM` magic, a little-endian `u32` format
//! version, then the bincode-encoded document. Loading always rebuilds the
//! diagram through the validating edit path, so a hand-edited file cannot
//! smuggle in a connection the editor would reject.

use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use anyhow::{Context, Result, bail};
use camino::Utf8Path;
use serde::{Deserialize, Serialize};

use crate::block::Block;
use crate::diagram::{Connection, Diagram};
use crate::error::GraphError;

const MAGIC: &[u8; 9] = b"TFDIAGRAM";
const VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagramDoc {
    pub blocks: Vec<Block>,
    #[serde(default)]
    pub connections: Vec<Connection>,
}

impl From<&Diagram> for DiagramDoc {
    fn from(diagram: &Diagram) -> Self {
        Self {
            blocks: diagram.blocks().cloned().collect(),
            connections: diagram.connections().copied().collect(),
        }
    }
}

impl DiagramDoc {
    /// Rebuild a diagram, rejecting duplicate ids and invalid connections.
    pub fn into_diagram(self) -> Result<Diagram, GraphError> {
        let mut diagram = Diagram::new();
        for block in self.blocks {
            diagram.insert_block(block)?;
        }
        for connection in self.connections {
            diagram.insert_connection(connection)?;
        }
        Ok(diagram)
    }

    pub fn from_json_str(text: &str) -> Result<Self> {
        serde_json::from_str(text).context("Failed to parse diagram JSON")
    }

    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn save_json<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        std::fs::write(path, self.to_json_string()?)
            .with_context(|| format!("Failed to write {}", path.display()))
    }

    pub fn load_json<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Self::from_json_str(&text)
    }

    /// Save to a binary file with magic bytes and versioning.
    pub fn save_to_binary<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let file = std::fs::File::create(path)?;
        let mut writer = BufWriter::new(file);
        writer.write_all(MAGIC)?;
        writer.write_all(&VERSION.to_le_bytes())?;
        bincode::serde::encode_into_std_write(self, &mut writer, bincode::config::standard())?;
        writer.flush()?;
        Ok(())
    }

    /// Load from a binary file, checking magic bytes and version.
    pub fn load_from_binary<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = std::fs::File::open(path)?;
        let mut reader = BufReader::new(file);
        let mut magic = [0u8; 9];
        reader.read_exact(&mut magic)?;
        if &magic != MAGIC {
            bail!("Invalid magic bytes: expected 'TFDIAGRAM'");
        }
        let mut version_bytes = [0u8; 4];
        reader.read_exact(&mut version_bytes)?;
        let version = u32::from_le_bytes(version_bytes);
        if version != VERSION {
            bail!("Unsupported version: {}", version);
        }
        let doc: DiagramDoc =
            bincode::serde::decode_from_std_read(&mut reader, bincode::config::standard())?;
        Ok(doc)
    }
}

impl Diagram {
    pub fn to_doc(&self) -> DiagramDoc {
        DiagramDoc::from(self)
    }

    pub fn from_doc(doc: DiagramDoc) -> Result<Self, GraphError> {
        doc.into_diagram()
    }
}

/// Load a diagram from `.json`, or from the binary format for any other
/// extension.
pub fn load_diagram(path: &Utf8Path) -> Result<Diagram> {
    let doc = if path.extension() == Some("json") {
        DiagramDoc::load_json(path)?
    } else {
        DiagramDoc::load_from_binary(path).with_context(|| format!("Failed to load {}", path))?
    };
    log::debug!(
        "loaded {} block(s), {} connection(s) from {}",
        doc.blocks.len(),
        doc.connections.len(),
        path
    );
    doc.into_diagram()
        .with_context(|| format!("Invalid diagram in {}", path))
}

//! Wire formats for the graph and the PQ codec (component C10).
//!
//! Grounded on the upstream `SegmentFooter` read/write pair (magic, version,
//! explicit field-by-field `byteorder` encode/decode, a `validate` step
//! before trusting the rest of the stream) but big-endian per the design,
//! and shaped around the graph's own header fields instead of a generic
//! segment footer.

use std::io::{Read, Write};

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};

use crate::config::BuilderConfig;
use crate::error::{IndexError, Result};
use crate::graph::GraphStore;
use crate::pq::ProductQuantizer;
use crate::provider::VectorProvider;
use crate::similarity::Similarity;

pub const GRAPH_MAGIC: u32 = 0x564D_4E41; // "VMNA"
pub const GRAPH_VERSION: u32 = 1;
pub const PQ_MAGIC: u32 = 0x5651_5043; // "VQPC"
pub const PQ_VERSION: u32 = 1;

fn io_corrupt(e: std::io::Error) -> IndexError {
    IndexError::SerializationCorrupt(e.to_string())
}

/// Write `graph` (and the config needed to reconstruct its builder) as the
/// big-endian graph stream described in the design.
pub fn write_graph<W: Write>(graph: &GraphStore, config: &BuilderConfig, writer: &mut W) -> Result<()> {
    let view = graph.read();
    let size = view.size() as u32;

    writer.write_u32::<BigEndian>(GRAPH_MAGIC).map_err(io_corrupt)?;
    writer.write_u32::<BigEndian>(GRAPH_VERSION).map_err(io_corrupt)?;
    writer
        .write_u32::<BigEndian>(config.dimension as u32)
        .map_err(io_corrupt)?;
    writer
        .write_u8(config.similarity.wire_code())
        .map_err(io_corrupt)?;
    writer.write_u32::<BigEndian>(size).map_err(io_corrupt)?;
    writer
        .write_u32::<BigEndian>(graph.entry().unwrap_or(0))
        .map_err(io_corrupt)?;
    writer.write_u16::<BigEndian>(config.m).map_err(io_corrupt)?;

    for ord in 0..size {
        let vector = view
            .vector_at(ord)
            .ok_or(IndexError::OrdinalOutOfRange(ord))?;
        for &x in vector {
            writer.write_f32::<BigEndian>(x).map_err(io_corrupt)?;
        }
        let neighbors = view
            .neighbor_list(ord)
            .map(|nl| nl.snapshot())
            .unwrap_or_default();
        writer
            .write_u16::<BigEndian>(neighbors.len() as u16)
            .map_err(io_corrupt)?;
        for (n, _) in neighbors {
            writer.write_u32::<BigEndian>(n).map_err(io_corrupt)?;
        }
    }
    Ok(())
}

/// Read a graph stream back into a fresh [`GraphStore`] plus the
/// [`BuilderConfig`] needed to keep inserting into it. Scores are not on the
/// wire; they're recomputed from the decoded vectors so the loaded neighbor
/// lists stay sorted and self-consistent.
pub fn read_graph<R: Read>(reader: &mut R) -> Result<(GraphStore, BuilderConfig)> {
    let magic = reader.read_u32::<BigEndian>().map_err(io_corrupt)?;
    if magic != GRAPH_MAGIC {
        return Err(IndexError::SerializationCorrupt(format!(
            "bad graph magic: {magic:#010x}"
        )));
    }
    let version = reader.read_u32::<BigEndian>().map_err(io_corrupt)?;
    if version != GRAPH_VERSION {
        return Err(IndexError::SerializationCorrupt(format!(
            "unsupported graph version: {version}"
        )));
    }
    let dimension = reader.read_u32::<BigEndian>().map_err(io_corrupt)? as usize;
    let similarity_code = reader.read_u8().map_err(io_corrupt)?;
    let similarity = Similarity::from_wire_code(similarity_code)
        .ok_or_else(|| IndexError::SerializationCorrupt(format!("bad similarity code {similarity_code}")))?;
    let size = reader.read_u32::<BigEndian>().map_err(io_corrupt)?;
    let entry_point = reader.read_u32::<BigEndian>().map_err(io_corrupt)?;
    let m = reader.read_u16::<BigEndian>().map_err(io_corrupt)?;

    let config = BuilderConfig {
        dimension: dimension as u16,
        similarity,
        m,
        ef_construction: m.max(1),
        alpha: 1.2,
    };
    config
        .validate()
        .map_err(|e| IndexError::SerializationCorrupt(format!("invalid config in stream: {e}")))?;

    let graph = GraphStore::new(similarity, m as usize, dimension);
    let mut raw_vectors: Vec<Vec<f32>> = Vec::with_capacity(size as usize);
    let mut raw_neighbors: Vec<Vec<u32>> = Vec::with_capacity(size as usize);

    for _ in 0..size {
        let mut vector = vec![0f32; dimension];
        for x in vector.iter_mut() {
            *x = reader.read_f32::<BigEndian>().map_err(io_corrupt)?;
            if !x.is_finite() {
                return Err(IndexError::SerializationCorrupt(
                    "non-finite vector component".into(),
                ));
            }
        }
        let neighbor_count = reader.read_u16::<BigEndian>().map_err(io_corrupt)?;
        let mut neighbors = Vec::with_capacity(neighbor_count as usize);
        for _ in 0..neighbor_count {
            neighbors.push(reader.read_u32::<BigEndian>().map_err(io_corrupt)?);
        }
        graph.allocate_node(&vector)?;
        raw_vectors.push(vector);
        raw_neighbors.push(neighbors);
    }

    for (ord, neighbor_ords) in raw_neighbors.into_iter().enumerate() {
        let ord = ord as u32;
        let owner_vec = &raw_vectors[ord as usize];
        let mut scored = Vec::with_capacity(neighbor_ords.len());
        for n in neighbor_ords {
            let Some(other) = raw_vectors.get(n as usize) else {
                return Err(IndexError::SerializationCorrupt(format!(
                    "neighbor ordinal {n} out of range"
                )));
            };
            scored.push((n, similarity.score(owner_vec, other)));
        }
        scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(b.0.cmp(&a.0))
        });
        if let Some(nl) = graph.neighbor_list_arc(ord) {
            nl.set(scored);
        }
        graph.publish(ord)?;
    }

    if size > 0 {
        if entry_point >= size {
            return Err(IndexError::SerializationCorrupt(format!(
                "entry point {entry_point} out of range for size {size}"
            )));
        }
        graph.force_set_entry(entry_point);
    }

    Ok((graph, config))
}

/// Write a trained [`ProductQuantizer`] as the big-endian PQ stream.
pub fn write_pq<W: Write>(pq: &ProductQuantizer, writer: &mut W) -> Result<()> {
    writer.write_u32::<BigEndian>(PQ_MAGIC).map_err(io_corrupt)?;
    writer.write_u32::<BigEndian>(PQ_VERSION).map_err(io_corrupt)?;
    writer
        .write_u32::<BigEndian>(pq.dimension() as u32)
        .map_err(io_corrupt)?;
    writer
        .write_u16::<BigEndian>(pq.m_pq() as u16)
        .map_err(io_corrupt)?;
    writer
        .write_u8(pq.global_centroid().is_some() as u8)
        .map_err(io_corrupt)?;
    if let Some(centroid) = pq.global_centroid() {
        for &x in centroid {
            writer.write_f32::<BigEndian>(x).map_err(io_corrupt)?;
        }
    }
    for i in 0..pq.m_pq() {
        let dim = pq.subspace_dims()[i];
        writer.write_u16::<BigEndian>(dim as u16).map_err(io_corrupt)?;
        for &x in pq.codebook(i) {
            writer.write_f32::<BigEndian>(x).map_err(io_corrupt)?;
        }
    }
    Ok(())
}

/// Read a PQ stream back into a trained [`ProductQuantizer`].
pub fn read_pq<R: Read>(reader: &mut R) -> Result<ProductQuantizer> {
    let magic = reader.read_u32::<BigEndian>().map_err(io_corrupt)?;
    if magic != PQ_MAGIC {
        return Err(IndexError::SerializationCorrupt(format!(
            "bad PQ magic: {magic:#010x}"
        )));
    }
    let version = reader.read_u32::<BigEndian>().map_err(io_corrupt)?;
    if version != PQ_VERSION {
        return Err(IndexError::SerializationCorrupt(format!(
            "unsupported PQ version: {version}"
        )));
    }
    let dimension = reader.read_u32::<BigEndian>().map_err(io_corrupt)? as usize;
    let m_pq = reader.read_u16::<BigEndian>().map_err(io_corrupt)? as usize;
    let has_global_centroid = reader.read_u8().map_err(io_corrupt)? != 0;

    let global_centroid = if has_global_centroid {
        let mut v = vec![0f32; dimension];
        for x in v.iter_mut() {
            *x = reader.read_f32::<BigEndian>().map_err(io_corrupt)?;
        }
        Some(v)
    } else {
        None
    };

    let mut subspace_dims = Vec::with_capacity(m_pq);
    let mut codebooks = Vec::with_capacity(m_pq);
    for _ in 0..m_pq {
        let dim = reader.read_u16::<BigEndian>().map_err(io_corrupt)? as usize;
        let mut book = vec![0f32; crate::pq::CODEBOOK_SIZE * dim];
        for x in book.iter_mut() {
            *x = reader.read_f32::<BigEndian>().map_err(io_corrupt)?;
            if !x.is_finite() {
                return Err(IndexError::SerializationCorrupt("non-finite centroid".into()));
            }
        }
        subspace_dims.push(dim);
        codebooks.push(book);
    }

    let centered = global_centroid.is_some();
    let mut pq = ProductQuantizer::with_partition(dimension, subspace_dims, centered)?;
    pq.load_trained(global_centroid, codebooks)?;
    Ok(pq)
}

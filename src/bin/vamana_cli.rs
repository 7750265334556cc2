//! Line-oriented IPC surface over a [`vamana_pq::Builder`] (§6 of the
//! design): `CREATE`, `WRITE`, `OPTIMIZE`, `SEARCH`, `MEMORY`, `BULKLOAD`,
//! one command per line on stdin, responses on stdout.

use std::fs::File;
use std::io::{self, BufRead, BufReader, Write};

use clap::Parser;
use vamana_pq::{Builder, BuilderConfig, Similarity};

#[derive(Parser)]
#[command(author, version, about = "Vamana/PQ index driven over a line protocol on stdin.")]
struct Cli;

fn parse_similarity(token: &str) -> Option<Similarity> {
    match token {
        "EUCLIDEAN" => Some(Similarity::Euclidean),
        "DOT_PRODUCT" => Some(Similarity::DotProduct),
        "COSINE" => Some(Similarity::Cosine),
        _ => None,
    }
}

fn parse_vector(token: &str) -> Option<Vec<f32>> {
    let inner = token.strip_prefix('[')?.strip_suffix(']')?;
    if inner.is_empty() {
        return Some(Vec::new());
    }
    inner.split(',').map(|s| s.parse::<f32>().ok()).collect()
}

fn bulkload_file(builder: &Builder, path: &str) -> Result<usize, String> {
    let file = File::open(path).map_err(|e| e.to_string())?;
    let mut count = 0;
    for line in BufReader::new(file).lines() {
        let line = line.map_err(|e| e.to_string())?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let vector = parse_vector(line).ok_or_else(|| format!("malformed vector: {line}"))?;
        builder.insert(&vector).map_err(|e| e.to_string())?;
        count += 1;
    }
    Ok(count)
}

/// One REPL session's mutable state: the builder doesn't exist until
/// `CREATE` names a configuration.
struct Session {
    builder: Option<Builder>,
}

impl Session {
    fn handle(&mut self, line: &str, out: &mut impl Write) -> Result<(), String> {
        let mut parts = line.split_whitespace();
        let command = parts.next().ok_or_else(|| "empty command".to_string())?;

        match command {
            "CREATE" => {
                let dim: u16 = parts.next().ok_or("CREATE: missing dim")?.parse().map_err(|_| "CREATE: bad dim")?;
                let sim = parts.next().ok_or("CREATE: missing similarity")?;
                let similarity = parse_similarity(sim).ok_or_else(|| format!("CREATE: unknown similarity {sim}"))?;
                let m: u16 = parts.next().ok_or("CREATE: missing M")?.parse().map_err(|_| "CREATE: bad M")?;
                let ef: u16 = parts
                    .next()
                    .ok_or("CREATE: missing ef_construction")?
                    .parse()
                    .map_err(|_| "CREATE: bad ef_construction")?;
                let config = BuilderConfig::new(dim, similarity, m, ef, 1.2).map_err(|e| e.to_string())?;
                self.builder = Some(Builder::new(config).map_err(|e| e.to_string())?);
                Ok(())
            }
            "WRITE" => {
                let builder = self.builder.as_ref().ok_or("WRITE: no graph created")?;
                let token = parts.next().ok_or("WRITE: missing vector")?;
                let vector = parse_vector(token).ok_or_else(|| format!("WRITE: malformed vector {token}"))?;
                builder.insert(&vector).map_err(|e| e.to_string())?;
                Ok(())
            }
            "OPTIMIZE" => Ok(()),
            "SEARCH" => {
                let builder = self.builder.as_ref().ok_or("SEARCH: no graph created")?;
                let ef_search: usize = parts.next().ok_or("SEARCH: missing ef_search")?.parse().map_err(|_| "SEARCH: bad ef_search")?;
                let top_k: usize = parts.next().ok_or("SEARCH: missing top_k")?.parse().map_err(|_| "SEARCH: bad top_k")?;
                let token = parts.next().ok_or("SEARCH: missing vector")?;
                let query = parse_vector(token).ok_or_else(|| format!("SEARCH: malformed vector {token}"))?;
                let results = builder.search(&query, top_k, ef_search).map_err(|e| e.to_string())?;
                let ords: Vec<String> = results.iter().map(|&(o, _)| o.to_string()).collect();
                writeln!(out, "RESULT [{}]", ords.join(",")).map_err(|e| e.to_string())?;
                Ok(())
            }
            "MEMORY" => {
                let builder = self.builder.as_ref().ok_or("MEMORY: no graph created")?;
                let dim = builder.config().dimension as usize;
                let n = builder.graph().allocated_len();
                let vector_bytes = n * dim * std::mem::size_of::<f32>();
                let neighbor_bytes = n * builder.config().m as usize * std::mem::size_of::<(u32, f32)>();
                writeln!(out, "MEMORY {}", vector_bytes + neighbor_bytes).map_err(|e| e.to_string())?;
                Ok(())
            }
            "BULKLOAD" => {
                let builder = self.builder.as_ref().ok_or("BULKLOAD: no graph created")?;
                let path = parts.next().ok_or("BULKLOAD: missing path")?;
                bulkload_file(builder, path)?;
                Ok(())
            }
            other => Err(format!("unknown command: {other}")),
        }
    }
}

fn main() {
    tracing_subscriber::fmt::init();
    let _cli = Cli::parse();

    let mut session = Session { builder: None };
    let stdout = io::stdout();
    let mut out = stdout.lock();

    let stdin = io::stdin();
    for line in stdin.lock().lines() {
        let line = match line {
            Ok(l) => l,
            Err(e) => {
                tracing::error!("stdin read error: {e}");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }
        if let Err(message) = session.handle(&line, &mut out) {
            let _ = writeln!(out, "ERR {message}");
        }
        let _ = out.flush();
    }
}

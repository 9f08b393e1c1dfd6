use crate::cli::args::{Cli, Commands, KeyArg, RankArgs};
use anyhow::{Context, Result, bail};
use clap::Parser;
use qgram_rank::core::alphabet::{Alphabet, DNA_SPEC, PROTEIN_SPEC};
use qgram_rank::core::engine::{self, QgramCounts, RunConfig, RunOutput};
use qgram_rank::core::io;
use qgram_rank::core::stats::StatsReporter;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

// Added to both counts before taking the ratio.
const PSEUDOCOUNT: f64 = 1.0;

pub fn entry() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Rank(args) => rank(args),
    }
}

fn rank(args: RankArgs) -> Result<()> {
    let stats = StatsReporter::from_env(false);
    let t0 = Instant::now();

    let t_pre = Instant::now();
    preflight(&args)?;
    stats.stage("preflight", t_pre);

    let alphabet = parse_alphabet(&args.alphabet)?;
    let cfg = RunConfig::new(args.q, alphabet.size())
        .with_threads(args.threads)
        .with_top_k(args.top)
        .with_min_shard_windows(args.min_shard_windows);
    cfg.codec().context("invalid q-gram configuration")?;

    let t_load = Instant::now();
    let (sequences, bytes) = load_corpus(&args.inputs, &alphabet, args.strict, args.threads)?;
    let background = if args.background.is_empty() {
        None
    } else {
        let (seqs, bg_bytes) =
            load_corpus(&args.background, &alphabet, args.strict, args.threads)?;
        stats.line(&format!(
            "background.sequences={} background.bytes={}",
            seqs.len(),
            bg_bytes
        ));
        Some(seqs)
    };
    stats.stage("load", t_load);
    stats.line(&format!(
        "input.sequences={} input.symbols={} input.bytes={}",
        sequences.len(),
        sequences.iter().map(Vec::len).sum::<usize>(),
        bytes
    ));

    let t_engine = Instant::now();
    let key = args.key;
    let output = engine::run(&cfg, &sequences, background.as_deref(), |c| {
        significance(key, c)
    })?;
    stats.stage("engine", t_engine);
    stats.line(&format!(
        "engine.windows={} engine.distinct={} engine.reported={}",
        output.total_windows,
        output.distinct_qgrams,
        output.ranked.len()
    ));

    let t_out = Instant::now();
    match &args.out {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("failed to create {}", path.display()))?;
            write_table(BufWriter::new(file), &output, &alphabet, key)
                .with_context(|| format!("failed to write {}", path.display()))?;
        }
        None => {
            let stdout = std::io::stdout();
            write_table(BufWriter::new(stdout.lock()), &output, &alphabet, key)
                .with_context(|| "failed to write ranking to stdout")?;
        }
    }
    stats.stage("output", t_out);
    stats.stage("total", t0);
    Ok(())
}

fn preflight(args: &RankArgs) -> Result<()> {
    for path in args.inputs.iter().chain(&args.background) {
        if path.as_os_str() == "-" {
            bail!("stdin is not supported; provide a sequence file path");
        }
        if !path.is_file() {
            bail!("input file not found: {}", path.display());
        }
    }
    if args.q == 0 {
        bail!("--q must be >= 1");
    }
    if args.min_shard_windows == 0 {
        bail!("--min-shard-windows must be >= 1");
    }
    if args.key == KeyArg::Log2Ratio && args.background.is_empty() {
        bail!("--key log2-ratio requires --background");
    }
    Ok(())
}

fn parse_alphabet(name: &str) -> Result<Alphabet> {
    let spec = match name {
        "dna" => DNA_SPEC,
        "protein" => PROTEIN_SPEC,
        other => other,
    };
    Alphabet::from_spec(spec).with_context(|| format!("invalid alphabet {:?}", name))
}

fn load_corpus(
    paths: &[PathBuf],
    alphabet: &Alphabet,
    strict: bool,
    threads: usize,
) -> Result<(Vec<Vec<u8>>, usize)> {
    let mut out = Vec::new();
    let mut bytes = 0usize;
    for path in paths {
        let raw = io::read_sequences(path, threads)
            .with_context(|| format!("failed to read {}", path.display()))?;
        bytes += raw.bytes;
        append_ranked(&mut out, raw.lines, alphabet, strict, path)?;
    }
    Ok((out, bytes))
}

fn append_ranked(
    out: &mut Vec<Vec<u8>>,
    lines: Vec<Vec<u8>>,
    alphabet: &Alphabet,
    strict: bool,
    path: &Path,
) -> Result<()> {
    for (i, line) in lines.into_iter().enumerate() {
        if strict {
            let ranks = alphabet.encode(&line).with_context(|| {
                format!("{}: sequence {}", path.display(), i + 1)
            })?;
            out.push(ranks);
        } else {
            out.extend(alphabet.segments(&line));
        }
    }
    Ok(())
}

fn significance(key: KeyArg, c: &QgramCounts) -> Option<f64> {
    match key {
        KeyArg::Count => Some(c.count as f64),
        KeyArg::Log2Ratio => {
            let bg = c.background?;
            let bg_total = c.background_total?;
            if c.total == 0 || bg_total == 0 {
                return None;
            }
            let fg = (c.count as f64 + PSEUDOCOUNT) / c.total as f64;
            let bg = (bg as f64 + PSEUDOCOUNT) / bg_total as f64;
            Some((fg / bg).log2())
        }
    }
}

fn write_table<W: Write>(
    mut w: W,
    output: &RunOutput<f64>,
    alphabet: &Alphabet,
    key: KeyArg,
) -> std::io::Result<()> {
    let with_bg = output.background_windows.is_some();
    if with_bg {
        writeln!(w, "#qgram\tcount\tbackground\tkey")?;
    } else {
        writeln!(w, "#qgram\tcount\tkey")?;
    }
    for row in &output.ranked {
        let qgram = alphabet.render(&row.qgram);
        let key_str = match key {
            KeyArg::Count => format!("{}", row.key as u64),
            KeyArg::Log2Ratio => format!("{:.4}", row.key),
        };
        match row.background {
            Some(bg) => writeln!(w, "{}\t{}\t{}\t{}", qgram, row.count, bg, key_str)?,
            None => writeln!(w, "{}\t{}\t{}", qgram, row.count, key_str)?,
        }
    }
    w.flush()
}

#[cfg(test)]
mod tests {
    use super::*;
    use qgram_rank::core::engine::RankedQgram;

    fn counts(count: u64, background: Option<u64>) -> QgramCounts {
        QgramCounts {
            code: 0,
            count,
            total: 100,
            background,
            background_total: background.map(|_| 100),
        }
    }

    #[test]
    fn test_count_key() {
        assert_eq!(significance(KeyArg::Count, &counts(7, None)), Some(7.0));
    }

    #[test]
    fn test_log2_ratio_key() {
        let k = significance(KeyArg::Log2Ratio, &counts(7, Some(1))).unwrap();
        assert!((k - 2.0).abs() < 1e-12);
        assert_eq!(significance(KeyArg::Log2Ratio, &counts(7, None)), None);
    }

    #[test]
    fn test_parse_alphabet() {
        assert_eq!(parse_alphabet("dna").unwrap().size(), 4);
        assert_eq!(parse_alphabet("protein").unwrap().size(), 20);
        assert_eq!(parse_alphabet("01").unwrap().size(), 1);
        assert_eq!(parse_alphabet("0|1").unwrap().size(), 2);
        assert!(parse_alphabet("A||C").is_err());
    }

    #[test]
    fn test_append_ranked_strict_and_split() {
        let a = Alphabet::dna();
        let lines = vec![b"ACNGT".to_vec()];
        let mut out = Vec::new();
        append_ranked(&mut out, lines.clone(), &a, false, Path::new("x")).unwrap();
        assert_eq!(out, vec![vec![0, 1], vec![2, 3]]);
        let mut out = Vec::new();
        assert!(append_ranked(&mut out, lines, &a, true, Path::new("x")).is_err());
    }

    #[test]
    fn test_load_corpus_counts_bytes_across_files() {
        use std::io::Write as _;
        let mut a = tempfile::NamedTempFile::new().unwrap();
        a.write_all(b">s1\nACGT\n").unwrap();
        let mut b = tempfile::NamedTempFile::new().unwrap();
        b.write_all(b"GGNCC\n").unwrap();
        let paths = vec![a.path().to_path_buf(), b.path().to_path_buf()];
        let (seqs, bytes) = load_corpus(&paths, &Alphabet::dna(), false, 1).unwrap();
        assert_eq!(seqs, vec![vec![0, 1, 2, 3], vec![2, 2], vec![1, 1]]);
        assert_eq!(bytes, 15);
    }

    #[test]
    fn test_write_table() {
        let output = RunOutput {
            ranked: vec![RankedQgram {
                code: 6,
                qgram: vec![1, 2],
                count: 3,
                background: None,
                key: 3.0,
            }],
            total_windows: 10,
            distinct_qgrams: 4,
            background_windows: None,
        };
        let mut buf = Vec::new();
        write_table(&mut buf, &output, &Alphabet::dna(), KeyArg::Count).unwrap();
        assert_eq!(String::from_utf8(buf).unwrap(), "#qgram\tcount\tkey\nCG\t3\t3\n");
    }
}

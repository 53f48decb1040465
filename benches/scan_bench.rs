// Criterion benchmark suite: decomposition, automaton scans, matcher scans
//
// Run: cargo bench
// Specific group: cargo bench -- scan
// HTML report: target/criterion/report/index.html

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use aho_corasick::AhoCorasick;
use regex_prefilter::automaton::{Automaton, PatternId};
use regex_prefilter::decode::DecodeMode;
use regex_prefilter::decompose::Decomposer;
use regex_prefilter::matcher::{Matcher, ScanState};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

const RULES: &[&str] = &[
    r"union\s+(all\s+)?select",
    r"select.+from\s+information_schema",
    r"<script[^>]*>",
    r"javascript:",
    r"on(load|error|mouseover)\s*=",
    r"\.\./\.\./",
    r"/etc/(passwd|shadow)",
    r"(cmd|powershell)\.exe",
    r"sleep\(\d+\)",
    r"benchmark\(\d+,",
    r"document\.cookie",
    r"eval\(.*\)",
];

fn corpus(len: usize) -> Vec<u8> {
    let filler = b"GET /index.php?page=home&lang=en&user=guest HTTP/1.1 Host: example.org ";
    let mut text = Vec::with_capacity(len);
    while text.len() < len {
        text.extend_from_slice(filler);
    }
    text.truncate(len);
    let tail = b" id=1 UNION ALL SELECT pass FROM users";
    let at = len.saturating_sub(tail.len());
    text[at..].copy_from_slice(&tail[..len - at]);
    text
}

fn rule_matcher() -> Matcher<usize> {
    let mut m = Matcher::default();
    for (i, rule) in RULES.iter().enumerate() {
        m.add_pattern(0, rule, i).expect("benchmark rule rejected");
    }
    m.compile(0).expect("compile failed");
    m
}

// ---------------------------------------------------------------------------
// 1. decompose -- pattern to branches
// ---------------------------------------------------------------------------

fn bench_decompose(c: &mut Criterion) {
    let mut group = c.benchmark_group("decompose");
    let mut decomposer = Decomposer::default();
    for (i, rule) in RULES.iter().enumerate().take(6) {
        group.bench_with_input(BenchmarkId::new("rule", i), rule, |b, rule| {
            b.iter(|| black_box(decomposer.decompose(black_box(rule)).map(|d| d.branches.len())));
        });
    }
    group.finish();
}

// ---------------------------------------------------------------------------
// 2. automaton -- raw keyword scan vs the aho-corasick crate
// ---------------------------------------------------------------------------

fn bench_automaton(c: &mut Criterion) {
    let keys: Vec<String> = (0..200).map(|i| format!("keyword{i:03}x")).collect();
    let mut ours: Automaton = Automaton::default();
    for (i, key) in keys.iter().enumerate() {
        ours.add(key.as_bytes(), PatternId::new(i as u32), false).expect("add failed");
    }
    assert!(ours.compile());
    let reference = AhoCorasick::builder()
        .ascii_case_insensitive(true)
        .build(&keys)
        .expect("reference build failed");

    let text = corpus(64 * 1024);
    let mut group = c.benchmark_group("automaton");
    group.throughput(Throughput::Bytes(text.len() as u64));
    group.bench_function("ours", |b| {
        b.iter(|| {
            let mut n = 0usize;
            ours.search(black_box(&text), DecodeMode::None, |_| {
                n += 1;
                false
            });
            black_box(n)
        });
    });
    group.bench_function("aho_corasick", |b| {
        b.iter(|| black_box(reference.find_overlapping_iter(black_box(&text[..])).count()));
    });
    group.finish();
}

// ---------------------------------------------------------------------------
// 3. scan -- full matcher over plain and encoded text
// ---------------------------------------------------------------------------

fn bench_scan(c: &mut Criterion) {
    let matcher = rule_matcher();
    let plain = corpus(16 * 1024);
    let encoded: Vec<u8> = plain
        .iter()
        .flat_map(|b| {
            if b.is_ascii_alphanumeric() {
                vec![*b]
            } else {
                format!("%{b:02X}").into_bytes()
            }
        })
        .collect();

    let mut state = ScanState::new();
    let mut group = c.benchmark_group("scan");
    for (name, text, mode) in [
        ("plain", &plain, DecodeMode::None),
        ("url_encoded", &encoded, DecodeMode::UrlEncodedUnicode),
    ] {
        group.throughput(Throughput::Bytes(text.len() as u64));
        group.bench_with_input(BenchmarkId::new("find_all", name), text, |b, text| {
            b.iter(|| {
                let found = matcher.find_all_with(&mut state, 0, black_box(text), mode);
                black_box(found.map(|v| v.len()))
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_decompose, bench_automaton, bench_scan);
criterion_main!(benches);

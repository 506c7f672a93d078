use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use ns_draw::{CompiledExpr, Drawer, JaggedCol, Table};
use std::hint::black_box;

fn make_events(n: usize) -> Table {
    // Deterministic pseudo-random jet multiplicities in 0..=5.
    let mut pt = Vec::with_capacity(n);
    let mut eta = Vec::with_capacity(n);
    let mut met = Vec::with_capacity(n);
    for i in 0..n {
        let n_jets = (i * 7 + 3) % 6;
        pt.push((0..n_jets).map(|j| 20.0 + ((i * 13 + j * 29) % 200) as f64).collect::<Vec<_>>());
        eta.push((0..n_jets).map(|j| (((i + j * 17) % 50) as f64 - 25.0) / 10.0).collect::<Vec<_>>());
        met.push(((i * 31) % 150) as f64);
    }
    Table::new()
        .with("Jet_pt", JaggedCol::from_rows(&pt))
        .unwrap()
        .with("Jet_eta", JaggedCol::from_rows(&eta))
        .unwrap()
        .with("MET_pt", met)
        .unwrap()
}

fn bench_compile(c: &mut Criterion) {
    let exprs = [
        "sum(Jet_pt[:2])",
        "sum(-0.8<Jet_eta<0.8 and Jet_pt>25)",
        "Jet_eta[argmin(Jet_pt)]",
        "sum(Jet_pt[(Jet_pt>40) and abs(Jet_eta)<2.4]) > 100 and MET_pt > 40",
    ];
    c.bench_function("compile_corpus", |b| {
        b.iter(|| {
            for e in exprs {
                black_box(CompiledExpr::compile(black_box(e)).unwrap());
            }
        })
    });
}

fn bench_draw(c: &mut Criterion) {
    let mut group = c.benchmark_group("draw_jagged");

    for n in [1_000usize, 10_000, 100_000] {
        let table = make_events(n);
        let mut drawer = Drawer::new();
        let prepared = drawer
            .prepare("Jet_pt[Jet_pt > 30]:Jet_eta[Jet_pt > 30]", Some("MET_pt > 40"), None)
            .unwrap();
        group.bench_with_input(BenchmarkId::new("masked_2d", n), &n, |b, _| {
            b.iter(|| black_box(drawer.run_arrays(&prepared, &table).unwrap()))
        });
        let prepared = drawer.prepare("sum(Jet_pt[:2])", None, Some("MET_pt / 100")).unwrap();
        group.bench_with_input(BenchmarkId::new("sliced_sum_weighted", n), &n, |b, _| {
            b.iter(|| black_box(drawer.run_arrays(&prepared, &table).unwrap()))
        });
    }

    group.finish();
}

criterion_group!(benches, bench_compile, bench_draw);
criterion_main!(benches);

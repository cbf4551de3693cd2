//! Inference benchmarks: clear vs virtual vs LWE execution of a compiled
//! decision tree, and random forest training with and without threads.

use std::time::Duration;

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use ndarray::s;
use quantree::testing::{DataSource, default_configuration, load_data};
use quantree::{
    DecisionTreeClassifier, DecisionTreeConfig, Execution, ForestConfig, RandomForestClassifier, TreeClassifier,
    TreeParams,
};

fn criterion_config() -> Criterion {
    Criterion::default()
        .configure_from_args()
        .warm_up_time(Duration::from_secs(1))
        .measurement_time(Duration::from_secs(5))
        .sample_size(10)
}

fn bench_predict(c: &mut Criterion) {
    let data = load_data(&DataSource::synthetic(200, 10, 2, 7)).unwrap().unwrap();
    let x = data.features();
    let head = x.slice(s![..5, ..]);
    let mut group = c.benchmark_group("inference/decision_tree");

    for depth in [3u32, 5] {
        let config = DecisionTreeConfig::builder()
            .n_bits(4)
            .tree(TreeParams::depth_wise(depth))
            .build()
            .unwrap();
        let mut model = DecisionTreeClassifier::new(config);
        model.fit(x, data.labels()).unwrap();

        group.bench_with_input(BenchmarkId::new("clear", depth), &head, |b, head| {
            b.iter(|| black_box(model.predict(black_box(*head), Execution::Clear).unwrap()))
        });

        model.compile(x, &default_configuration(), true).unwrap();
        group.bench_with_input(BenchmarkId::new("virtual", depth), &head, |b, head| {
            b.iter(|| black_box(model.predict(black_box(*head), Execution::Fhe).unwrap()))
        });

        model.compile(x, &default_configuration(), false).unwrap();
        group.bench_with_input(BenchmarkId::new("encrypted", depth), &head, |b, head| {
            b.iter(|| black_box(model.predict(black_box(*head), Execution::Fhe).unwrap()))
        });
    }
    group.finish();
}

fn bench_forest_training(c: &mut Criterion) {
    let data = load_data(&DataSource::synthetic(1000, 10, 2, 11)).unwrap().unwrap();
    let mut group = c.benchmark_group("train/random_forest");

    for n_threads in [1usize, 0] {
        let label = if n_threads == 1 { "sequential" } else { "parallel" };
        let config = ForestConfig::builder().n_estimators(20).n_threads(n_threads).build().unwrap();
        group.bench_function(label, |b| {
            b.iter(|| {
                let mut model = RandomForestClassifier::new(config.clone());
                model.fit(black_box(data.features()), data.labels()).unwrap();
                black_box(model)
            })
        });
    }
    group.finish();
}

criterion_group! {
    name = benches;
    config = criterion_config();
    targets = bench_predict, bench_forest_training
}
criterion_main!(benches);

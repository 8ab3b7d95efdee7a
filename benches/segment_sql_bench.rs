use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use segment_sql::condition::{
    AttributeCondition, ConditionGroup, EventCondition, EventType, FilterCriteria, Frequency, RelatedCondition,
};
use segment_sql::lexer::Lexer;
use segment_sql::operator::{LogicalOperator, Operator};
use segment_sql::sql_compiler::SqlCompiler;
use segment_sql::sql_parser::parse_sql;
use std::hint::black_box;

// 构造不同规模的条件树
fn criteria_cases() -> Vec<(&'static str, FilterCriteria)> {
    let simple = FilterCriteria {
        condition_groups: vec![ConditionGroup::new(1, LogicalOperator::And)
            .with_condition(AttributeCondition::new(2, "city", Operator::Equals, "Hanoi"))],
        ..Default::default()
    };

    let medium = FilterCriteria {
        condition_groups: vec![
            ConditionGroup::new(1, LogicalOperator::And)
                .with_condition(AttributeCondition::new(2, "city", Operator::Equals, "Hanoi"))
                .with_condition(AttributeCondition::new(3, "age", Operator::Between, "18").with_second_value("30")),
            ConditionGroup::new(4, LogicalOperator::Or)
                .with_condition(AttributeCondition::new(5, "tier", Operator::Equals, "gold"))
                .with_condition(AttributeCondition::new(6, "tier", Operator::Equals, "silver")),
        ],
        root_operator: LogicalOperator::Or,
        ..Default::default()
    };

    let mut event = EventCondition::new(8, "customer_id", "customer_id", EventType::Performed)
        .with_frequency(Frequency::AtLeast, 3)
        .within(30, "days");
    event
        .attribute_conditions
        .push(AttributeCondition::new(9, "channel", Operator::Equals, "web").into());
    let mut related = RelatedCondition::new(10, "products", "product_id");
    related
        .related_attribute_conditions
        .push(AttributeCondition::new(11, "category", Operator::Equals, "shoes"));
    event.related_conditions.push(related);
    let mut complex = medium.clone();
    complex
        .condition_groups
        .push(ConditionGroup::new(7, LogicalOperator::And).with_condition(event));

    vec![("simple", simple), ("medium", medium), ("complex", complex)]
}

// 基准测试：SQL生成性能
fn benchmark_generate(c: &mut Criterion) {
    let compiler = SqlCompiler::new();
    let mut group = c.benchmark_group("generate_sql");

    for (name, criteria) in criteria_cases() {
        group.bench_with_input(BenchmarkId::new("compile_criteria", name), &criteria, |b, criteria| {
            b.iter(|| black_box(compiler.compile_criteria(black_box("customers"), black_box(criteria))))
        });
    }

    group.finish();
}

// 基准测试：词法分析和反向解析性能
fn benchmark_parse(c: &mut Criterion) {
    let compiler = SqlCompiler::new();
    let mut group = c.benchmark_group("parse_sql");

    for (name, criteria) in criteria_cases() {
        let sql = compiler.compile_criteria("customers", &criteria);
        group.bench_with_input(BenchmarkId::new("tokenize", name), &sql, |b, sql| {
            b.iter(|| {
                let tokens: Vec<_> = Lexer::new(black_box(sql)).collect();
                black_box(tokens)
            })
        });
        group.bench_with_input(BenchmarkId::new("parse", name), &sql, |b, sql| {
            b.iter(|| black_box(parse_sql(black_box(sql))))
        });
    }

    group.finish();
}

// 基准测试：树 → SQL → 树 的完整往返
fn benchmark_round_trip(c: &mut Criterion) {
    let compiler = SqlCompiler::new();
    let mut group = c.benchmark_group("round_trip");

    for (name, criteria) in criteria_cases() {
        group.bench_with_input(BenchmarkId::new("tree_sql_tree", name), &criteria, |b, criteria| {
            b.iter(|| {
                let sql = compiler.compile_criteria("customers", black_box(criteria));
                let parsed = parse_sql(&sql);
                black_box(compiler.compile_criteria("customers", &parsed.into_criteria()))
            })
        });
    }

    group.finish();
}

criterion_group!(benches, benchmark_generate, benchmark_parse, benchmark_round_trip);
criterion_main!(benches);

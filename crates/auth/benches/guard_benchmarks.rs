use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use chrono::{Duration, Utc};
use portal_auth::{
    AccessGuard, AdminIdentity, DocumentKind, DocumentRecord, DocumentStatus, Identity,
    RouteRequirements, SessionSnapshot, UserIdentity, VerificationStatus,
};
use portal_core::{AdminId, UserId};

fn investor(status: VerificationStatus) -> UserIdentity {
    UserIdentity::new(UserId::new(), "investor@example.com")
        .with_status(status)
        .with_document(DocumentKind::Aadhaar, DocumentRecord::new(DocumentStatus::Verified))
        .with_document(DocumentKind::Pan, DocumentRecord::rejected("blurred scan"))
}

fn admin() -> AdminIdentity {
    AdminIdentity {
        id: AdminId::new(),
        email: "ops@example.com".to_string(),
        session_expiry: Utc::now() + Duration::minutes(30),
    }
}

fn snapshots() -> Vec<(&'static str, SessionSnapshot)> {
    vec![
        ("loading", SessionSnapshot::Loading),
        ("anonymous", SessionSnapshot::anonymous()),
        (
            "verified_investor",
            SessionSnapshot::Ready(Identity::User(investor(VerificationStatus::Verified))),
        ),
        (
            "pending_investor",
            SessionSnapshot::Ready(Identity::User(investor(VerificationStatus::Pending))),
        ),
        (
            "admin_with_investor",
            SessionSnapshot::Ready(
                Identity::User(investor(VerificationStatus::Rejected)).with_admin(admin()),
            ),
        ),
    ]
}

fn bench_evaluate(c: &mut Criterion) {
    let guard = AccessGuard::default();
    let mut group = c.benchmark_group("guard_evaluate");
    group.throughput(Throughput::Elements(1));

    for (name, snapshot) in snapshots() {
        group.bench_with_input(BenchmarkId::from_parameter(name), &snapshot, |b, snapshot| {
            b.iter(|| guard.evaluate(black_box(RouteRequirements::verified()), black_box(snapshot)));
        });
    }

    group.finish();
}

fn bench_explain(c: &mut Criterion) {
    let guard = AccessGuard::default();
    let mut group = c.benchmark_group("guard_explain");

    // Worst case: verification redirect builds the reason and the notice.
    let snapshot = SessionSnapshot::Ready(Identity::User(investor(VerificationStatus::Rejected)));
    group.bench_function("verification_redirect", |b| {
        b.iter(|| guard.explain(black_box(RouteRequirements::verified()), black_box(&snapshot)));
    });

    group.finish();
}

criterion_group!(benches, bench_evaluate, bench_explain);
criterion_main!(benches);

use std::collections::HashMap;
use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use keel_resolver::{
    BoundVersion, Constraint, Container, ContainerProvider, DependencyResolver, PackageId,
    ProviderError, Resolution,
};
use keel_semver::{Version, VersionSetSpecifier};

fn pkg(name: &str) -> PackageId {
    PackageId::new(name, format!("https://example.com/{name}.git"))
}

fn ver(s: &str) -> Version {
    s.parse().unwrap()
}

#[derive(Debug)]
struct BenchContainer {
    id: PackageId,
    versions: Vec<(Version, Vec<Constraint>)>,
}

impl Container for BenchContainer {
    fn package_id(&self) -> &PackageId {
        &self.id
    }

    fn versions(&self) -> Result<Vec<Version>, ProviderError> {
        Ok(self.versions.iter().map(|(v, _)| v.clone()).collect())
    }

    fn dependencies_at_version(&self, version: &Version) -> Result<Vec<Constraint>, ProviderError> {
        self.versions
            .iter()
            .find(|(v, _)| v == version)
            .map(|(_, deps)| deps.clone())
            .ok_or_else(|| ProviderError::msg("unknown version"))
    }

    fn dependencies_at_revision(&self, _: &str) -> Result<Vec<Constraint>, ProviderError> {
        Err(ProviderError::msg("no revisions"))
    }

    fn unversioned_dependencies(&self) -> Result<Vec<Constraint>, ProviderError> {
        Ok(Vec::new())
    }

    fn updated_identifier(&self, _: &BoundVersion) -> Result<PackageId, ProviderError> {
        Ok(self.id.clone())
    }
}

struct BenchProvider {
    containers: HashMap<PackageId, Arc<BenchContainer>>,
}

impl ContainerProvider for BenchProvider {
    fn fetch_container(
        &self,
        id: &PackageId,
        _skip_update: bool,
    ) -> Result<Arc<dyn Container>, ProviderError> {
        self.containers
            .get(id)
            .map(|c| Arc::clone(c) as Arc<dyn Container>)
            .ok_or_else(|| ProviderError::msg("unknown package"))
    }
}

fn dep_any(name: &str) -> Constraint {
    Constraint::versioned(pkg(name), VersionSetSpecifier::Any)
}

/// pkg0 -> pkg1 -> ... -> pkgN, three versions each, latest first.
fn chain_provider(depth: usize) -> BenchProvider {
    let mut containers = HashMap::new();
    for i in 0..depth {
        let id = pkg(&format!("pkg{i}"));
        let deps = if i + 1 < depth {
            vec![dep_any(&format!("pkg{}", i + 1))]
        } else {
            Vec::new()
        };
        let container = BenchContainer {
            id: id.clone(),
            versions: vec![
                (ver("1.2.0"), deps.clone()),
                (ver("1.1.0"), deps.clone()),
                (ver("1.0.0"), deps),
            ],
        };
        containers.insert(id, Arc::new(container));
    }
    BenchProvider { containers }
}

/// One root depending on N leaves.
fn fanout_provider(width: usize) -> BenchProvider {
    let mut containers = HashMap::new();
    let deps: Vec<Constraint> = (0..width).map(|i| dep_any(&format!("leaf{i}"))).collect();
    let root = pkg("root");
    containers.insert(
        root.clone(),
        Arc::new(BenchContainer {
            id: root,
            versions: vec![(ver("1.0.0"), deps)],
        }),
    );
    for i in 0..width {
        let id = pkg(&format!("leaf{i}"));
        containers.insert(
            id.clone(),
            Arc::new(BenchContainer {
                id,
                versions: vec![(ver("2.0.0"), Vec::new()), (ver("1.0.0"), Vec::new())],
            }),
        );
    }
    BenchProvider { containers }
}

fn bench_chain(c: &mut Criterion) {
    c.bench_function("resolve_chain_depth_20", |b| {
        b.iter(|| {
            let resolver =
                DependencyResolver::new(Arc::new(chain_provider(20)), None, false, false);
            let resolution = resolver.resolve(black_box(&[dep_any("pkg0")]), &[]);
            assert!(matches!(resolution, Resolution::Success(_)));
            black_box(resolution)
        })
    });
}

fn bench_fanout(c: &mut Criterion) {
    c.bench_function("resolve_fanout_width_50", |b| {
        b.iter(|| {
            let resolver =
                DependencyResolver::new(Arc::new(fanout_provider(50)), None, false, false);
            let resolution = resolver.resolve(black_box(&[dep_any("root")]), &[]);
            assert!(matches!(resolution, Resolution::Success(_)));
            black_box(resolution)
        })
    });
}

criterion_group!(benches, bench_chain, bench_fanout);
criterion_main!(benches);

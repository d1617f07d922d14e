//! Consolidation of entity name variants.
//!
//! The same firm shows up under slightly different spellings across filing
//! periods ("ACME VALORES S.V." vs "ACME VALORES, S.V."). Names are clustered
//! with a pluggable [`NameMatcher`] over a union-find, each cluster is mapped
//! onto its best-supported spelling, and rows that then collide on
//! (entity, quarter) are collapsed to the most complete one.
//!
//! The default matcher is a heuristic and can merge distinct firms sharing a
//! long prefix. Every merge is logged at `info` and returned as a
//! [`MergeDecision`] so it can be audited.

use crate::config::ResolverConfig;
use crate::schema::{EntityIdentity, EntityType, MergeDecision, Period, QuarterlyRecord};
use log::{debug, info, warn};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

/// Decides whether two normalized entity names refer to the same firm.
pub trait NameMatcher {
    fn is_match(&self, a: &str, b: &str) -> bool;
}

/// Upper-cased name with every non-alphanumeric character removed.
pub fn match_key(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(|c| c.to_uppercase())
        .collect()
}

/// Substring-or-shared-prefix matching on [`match_key`]s.
#[derive(Debug, Clone)]
pub struct SubstringPrefixMatcher {
    pub prefix_len: usize,
    pub min_key_len: usize,
}

impl SubstringPrefixMatcher {
    pub fn from_config(config: &ResolverConfig) -> Self {
        Self {
            prefix_len: config.prefix_len,
            min_key_len: config.min_key_len,
        }
    }
}

impl Default for SubstringPrefixMatcher {
    fn default() -> Self {
        Self::from_config(&ResolverConfig::default())
    }
}

impl NameMatcher for SubstringPrefixMatcher {
    fn is_match(&self, a: &str, b: &str) -> bool {
        let ka: Vec<char> = match_key(a).chars().collect();
        let kb: Vec<char> = match_key(b).chars().collect();

        let shorter = ka.len().min(kb.len());
        if shorter == 0 || shorter < self.min_key_len {
            return false;
        }

        let (short, long) = if ka.len() <= kb.len() {
            (&ka, &kb)
        } else {
            (&kb, &ka)
        };
        if long.windows(short.len()).any(|w| w == short.as_slice()) {
            return true;
        }

        let n = self.prefix_len.min(shorter);
        ka[..n] == kb[..n]
    }
}

struct UnionFind {
    parent: Vec<usize>,
    rank: Vec<usize>,
}

impl UnionFind {
    fn new(size: usize) -> Self {
        Self {
            parent: (0..size).collect(),
            rank: vec![0; size],
        }
    }

    fn find(&mut self, x: usize) -> usize {
        let mut root = x;
        while self.parent[root] != root {
            root = self.parent[root];
        }
        let mut node = x;
        while self.parent[node] != root {
            let next = self.parent[node];
            self.parent[node] = root;
            node = next;
        }
        root
    }

    fn union(&mut self, a: usize, b: usize) {
        let ra = self.find(a);
        let rb = self.find(b);
        if ra == rb {
            return;
        }
        match self.rank[ra].cmp(&self.rank[rb]) {
            Ordering::Less => self.parent[ra] = rb,
            Ordering::Greater => self.parent[rb] = ra,
            Ordering::Equal => {
                self.parent[rb] = ra;
                self.rank[ra] += 1;
            }
        }
    }
}

/// Connected components of the pairwise `eligible && matcher` relation.
///
/// Each cluster holds indices into `names`, ascending; clusters are ordered by
/// their smallest index.
pub fn cluster_names(
    names: &[String],
    matcher: &dyn NameMatcher,
    eligible: impl Fn(usize, usize) -> bool,
) -> Vec<Vec<usize>> {
    let mut uf = UnionFind::new(names.len());

    for i in 0..names.len() {
        for j in (i + 1)..names.len() {
            if eligible(i, j) && matcher.is_match(&names[i], &names[j]) {
                uf.union(i, j);
            }
        }
    }

    let mut clusters: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for i in 0..names.len() {
        let root = uf.find(i);
        clusters.entry(root).or_default().push(i);
    }

    let mut result: Vec<Vec<usize>> = clusters.into_values().collect();
    result.sort_by_key(|c| c[0]);
    result
}

#[derive(Debug, Clone, Copy, Default)]
struct VariantStats {
    revenue_rows: usize,
    asset_rows: usize,
    rows: usize,
}

impl VariantStats {
    fn score(&self, config: &ResolverConfig) -> f64 {
        self.revenue_rows as f64 * config.revenue_weight
            + self.asset_rows as f64 * config.assets_weight
            + self.rows as f64 * config.rows_weight
    }
}

/// Completeness of a single quarterly row, used to break (entity, quarter) collisions.
pub fn row_completeness(record: &QuarterlyRecord) -> u32 {
    let mut score = 0;
    if record.flows.commissions_received != 0.0 {
        score += 3;
    }
    if record.stocks.total_assets > 0.0 {
        score += 2;
    }
    if record.stocks.equity != 0.0 {
        score += 1;
    }
    score
}

/// Output of one resolver pass.
#[derive(Debug, Clone, Default)]
pub struct Resolution {
    pub records: Vec<QuarterlyRecord>,
    pub identities: Vec<EntityIdentity>,
    pub merges: Vec<MergeDecision>,
}

struct NameMap {
    canonical_of: BTreeMap<String, String>,
    variants_of: BTreeMap<String, Vec<String>>,
    merges: Vec<MergeDecision>,
}

pub struct EntityResolver {
    config: ResolverConfig,
    matcher: Box<dyn NameMatcher>,
}

impl EntityResolver {
    pub fn new(config: ResolverConfig) -> Self {
        let matcher = Box::new(SubstringPrefixMatcher::from_config(&config));
        Self { config, matcher }
    }

    pub fn with_matcher(config: ResolverConfig, matcher: Box<dyn NameMatcher>) -> Self {
        Self { config, matcher }
    }

    pub fn resolve(&self, records: Vec<QuarterlyRecord>) -> Resolution {
        let NameMap {
            canonical_of,
            variants_of,
            merges,
        } = self.build_name_map(&records);

        let mut renamed = records;
        for record in &mut renamed {
            if let Some(canonical) = canonical_of.get(&record.entity) {
                record.entity = canonical.clone();
            }
        }

        let consistent = drop_inconsistent_types(renamed);
        let records = collapse_duplicates(consistent);

        let mut types: BTreeMap<&str, EntityType> = BTreeMap::new();
        for record in &records {
            types.insert(record.entity.as_str(), record.entity_type);
        }

        let identities = types
            .into_iter()
            .map(|(name, entity_type)| EntityIdentity {
                canonical_name: name.to_string(),
                entity_type,
                variants: variants_of
                    .get(name)
                    .cloned()
                    .unwrap_or_else(|| vec![name.to_string()]),
            })
            .collect();

        Resolution {
            records,
            identities,
            merges,
        }
    }

    /// Maps every name to its cluster's canonical spelling.
    fn build_name_map(&self, records: &[QuarterlyRecord]) -> NameMap {
        let mut stats: BTreeMap<String, VariantStats> = BTreeMap::new();
        let mut types: BTreeMap<String, BTreeSet<EntityType>> = BTreeMap::new();

        for record in records {
            let s = stats.entry(record.entity.clone()).or_default();
            s.rows += 1;
            if record.flows.commissions_received != 0.0 {
                s.revenue_rows += 1;
            }
            if record.stocks.total_assets > 0.0 {
                s.asset_rows += 1;
            }
            types
                .entry(record.entity.clone())
                .or_default()
                .insert(record.entity_type);
        }

        let names: Vec<String> = stats.keys().cloned().collect();
        let partition = self.config.partition_by_type;
        let eligible = |i: usize, j: usize| {
            !partition || !types[&names[i]].is_disjoint(&types[&names[j]])
        };

        let clusters = cluster_names(&names, self.matcher.as_ref(), eligible);

        let mut canonical_of = BTreeMap::new();
        let mut variants_of = BTreeMap::new();
        let mut merges = Vec::new();

        for cluster in clusters {
            let mut members: Vec<&String> = cluster.iter().map(|&i| &names[i]).collect();
            members.sort_by(|a, b| {
                let sa = stats[*a].score(&self.config);
                let sb = stats[*b].score(&self.config);
                sb.total_cmp(&sa)
                    .then_with(|| b.chars().count().cmp(&a.chars().count()))
                    .then_with(|| a.cmp(b))
            });

            let canonical = members[0].clone();
            let canonical_score = stats[&canonical].score(&self.config);

            for variant in members.iter().skip(1) {
                let decision = MergeDecision {
                    variant: (*variant).clone(),
                    canonical: canonical.clone(),
                    variant_score: stats[*variant].score(&self.config),
                    canonical_score,
                };
                info!(
                    "Merging '{}' (score {:.1}) into '{}' (score {:.1})",
                    decision.variant,
                    decision.variant_score,
                    decision.canonical,
                    decision.canonical_score
                );
                merges.push(decision);
            }

            let mut variants: Vec<String> = members.iter().map(|m| (*m).clone()).collect();
            variants.sort();
            for member in &members {
                canonical_of.insert((*member).clone(), canonical.clone());
            }
            variants_of.insert(canonical, variants);
        }

        NameMap {
            canonical_of,
            variants_of,
            merges,
        }
    }
}

/// Removes every entity whose rows carry more than one entity type.
fn drop_inconsistent_types(records: Vec<QuarterlyRecord>) -> Vec<QuarterlyRecord> {
    let mut types: BTreeMap<String, BTreeSet<EntityType>> = BTreeMap::new();
    for record in &records {
        types
            .entry(record.entity.clone())
            .or_default()
            .insert(record.entity_type);
    }

    let conflicting: BTreeSet<&String> = types
        .iter()
        .filter(|(_, t)| t.len() > 1)
        .map(|(name, _)| name)
        .collect();

    for name in &conflicting {
        warn!(
            "Dropping '{}': filed as both {} and {}",
            name,
            EntityType::SecuritiesFirm,
            EntityType::SecuritiesAgency
        );
    }

    if conflicting.is_empty() {
        return records;
    }

    records
        .into_iter()
        .filter(|r| !conflicting.contains(&r.entity))
        .collect()
}

/// Keeps the most complete row for each (entity, quarter).
fn collapse_duplicates(records: Vec<QuarterlyRecord>) -> Vec<QuarterlyRecord> {
    let total = records.len();
    let mut best: BTreeMap<(String, Period), QuarterlyRecord> = BTreeMap::new();

    for record in records {
        let key = (record.entity.clone(), record.period_key());
        match best.get(&key) {
            Some(current) if !is_better_row(&record, current) => {}
            _ => {
                best.insert(key, record);
            }
        }
    }

    if best.len() < total {
        debug!(
            "Collapsed {} duplicate (entity, quarter) rows",
            total - best.len()
        );
    }

    best.into_values().collect()
}

/// Strictly better; on a full tie the row seen first stays.
fn is_better_row(candidate: &QuarterlyRecord, current: &QuarterlyRecord) -> bool {
    let cs = row_completeness(candidate);
    let ks = row_completeness(current);
    if cs != ks {
        return cs > ks;
    }
    let candidate_native = candidate.reported_name == candidate.entity;
    let current_native = current.reported_name == current.entity;
    candidate_native && !current_native
}

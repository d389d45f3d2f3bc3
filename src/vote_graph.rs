// vote_graph.rs
use log::{debug, info};
use petgraph::graph::{DiGraph, EdgeIndex, NodeIndex};
use petgraph::visit::EdgeRef;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap};

use crate::models::{CounterpartPoints, CountryVoteProfile, VoteDirection, VoteEdge, Year};
use crate::rows::{RawVoteRow, RowOutcome, RowParser, RowTally, SkipReason};

/// Size of the ranked counterpart pool kept for each country.
pub const TOP_COUNTERPARTS: usize = 4;

/// Vote rows returned for one (country, direction, year) query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CountryVotes {
    pub country: String,
    pub direction: VoteDirection,
    pub year: Year,
    pub rows: Vec<RawVoteRow>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VoteWeight {
    pub year: Year,
    pub points: u32,
}

/// Points one country awarded (or received) in a single year, ranked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct YearlyVotes {
    pub country: String,
    pub year: Year,
    pub voted: Vec<CounterpartPoints>,
}

#[derive(Default)]
pub struct VoteGraphBuilder {
    graph: DiGraph<String, VoteWeight>,
    node_map: HashMap<String, NodeIndex>,
    edge_map: HashMap<(Year, NodeIndex, NodeIndex), EdgeIndex>,
    tally: RowTally,
}

impl VoteGraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a country so it gets a (possibly empty) profile.
    pub fn add_country(&mut self, name: &str) -> NodeIndex {
        let graph = &mut self.graph;
        *self
            .node_map
            .entry(name.to_string())
            .or_insert_with(|| graph.add_node(name.to_string()))
    }

    /// Adds the parsable rows of one query result as year-stamped edges.
    /// A recurring (year, source, target) triple overwrites the earlier points.
    pub fn ingest(&mut self, parser: &RowParser, votes: &CountryVotes) {
        let direction = votes.direction;
        let queried = self.add_country(&votes.country);
        for row in &votes.rows {
            let outcome = match parser.vote(row) {
                RowOutcome::Parsed((counterpart, _)) if counterpart == votes.country => {
                    RowOutcome::Skipped(SkipReason::SelfVote(counterpart))
                }
                outcome => outcome,
            };
            self.tally.record(&outcome);
            let (counterpart, points) = match outcome {
                RowOutcome::Parsed(parsed) => parsed,
                RowOutcome::Skipped(reason) => {
                    debug!(
                        "Skipping vote row for {} {} ({}): {:?}",
                        votes.country,
                        votes.year,
                        direction.as_str(),
                        reason
                    );
                    continue;
                }
            };
            let other = self.add_country(&counterpart);
            let (source, target) = match direction {
                VoteDirection::Given => (queried, other),
                VoteDirection::Received => (other, queried),
            };
            self.set_edge(votes.year, source, target, points);
        }
    }

    fn set_edge(&mut self, year: Year, source: NodeIndex, target: NodeIndex, points: u32) {
        let weight = VoteWeight { year, points };
        match self.edge_map.get(&(year, source, target)) {
            Some(&edge) => self.graph[edge] = weight,
            None => {
                let edge = self.graph.add_edge(source, target, weight);
                self.edge_map.insert((year, source, target), edge);
            }
        }
    }

    pub fn build(self) -> VoteGraph {
        info!(
            "Built vote graph with {} countries and {} year-stamped edges ({} rows skipped).",
            self.graph.node_count(),
            self.graph.edge_count(),
            self.tally.skipped_total()
        );
        VoteGraph { graph: self.graph, node_map: self.node_map, tally: self.tally }
    }
}

/// Directed, year-stamped graph of points between countries.
pub struct VoteGraph {
    graph: DiGraph<String, VoteWeight>,
    node_map: HashMap<String, NodeIndex>,
    tally: RowTally,
}

impl VoteGraph {
    pub fn tally(&self) -> &RowTally {
        &self.tally
    }

    pub fn country_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// All edges in the order they were first seen.
    pub fn edges(&self) -> Vec<VoteEdge> {
        self.graph
            .edge_references()
            .map(|e| VoteEdge {
                year: e.weight().year,
                source: self.graph[e.source()].clone(),
                target: self.graph[e.target()].clone(),
                points: e.weight().points,
            })
            .collect()
    }

    /// One profile per country: counterparts summed over all years, sorted by
    /// total descending. Ties keep the order in which the pair was first seen.
    pub fn profiles(&self, direction: VoteDirection) -> Vec<CountryVoteProfile> {
        let mut totals: Vec<Vec<(NodeIndex, u64)>> = vec![Vec::new(); self.graph.node_count()];
        let mut slots: HashMap<(NodeIndex, NodeIndex), usize> = HashMap::new();

        for edge in self.graph.edge_references() {
            let (owner, counterpart) = match direction {
                VoteDirection::Given => (edge.source(), edge.target()),
                VoteDirection::Received => (edge.target(), edge.source()),
            };
            let points = u64::from(edge.weight().points);
            let list = &mut totals[owner.index()];
            match slots.get(&(owner, counterpart)) {
                Some(&i) => list[i].1 += points,
                None => {
                    slots.insert((owner, counterpart), list.len());
                    list.push((counterpart, points));
                }
            }
        }

        self.graph
            .node_indices()
            .map(|node| {
                let mut counterparts: Vec<CounterpartPoints> = totals[node.index()]
                    .iter()
                    .map(|(other, points)| CounterpartPoints {
                        country: self.graph[*other].clone(),
                        points: *points,
                    })
                    .collect();
                counterparts.sort_by(|a, b| b.points.cmp(&a.points));
                CountryVoteProfile { country: self.graph[node].clone(), counterparts }
            })
            .collect()
    }

    /// Ranked per-(country, year) lists, countries in registration order and
    /// years ascending.
    pub fn yearly(&self, direction: VoteDirection) -> Vec<YearlyVotes> {
        let mut grouped: BTreeMap<(usize, Year), (String, Vec<CounterpartPoints>)> = BTreeMap::new();
        for edge in self.edges() {
            let (owner, counterpart) = match direction {
                VoteDirection::Given => (edge.source, edge.target),
                VoteDirection::Received => (edge.target, edge.source),
            };
            let order = self.node_map.get(&owner).map(|n| n.index()).unwrap_or_default();
            grouped
                .entry((order, edge.year))
                .or_insert_with(|| (owner, Vec::new()))
                .1
                .push(CounterpartPoints { country: counterpart, points: u64::from(edge.points) });
        }
        grouped
            .into_iter()
            .map(|((_, year), (country, mut voted))| {
                voted.sort_by(|a, b| b.points.cmp(&a.points));
                YearlyVotes { country, year, voted }
            })
            .collect()
    }
}

/// `all_points_given_from` / `all_points_given_to` document for a profile.
pub fn profile_document(profile: &CountryVoteProfile, direction: VoteDirection) -> Value {
    let field = match direction {
        VoteDirection::Given => "voted_to",
        VoteDirection::Received => "get_votes_from",
    };
    json!({
        "country": profile.country,
        field: profile.counterparts,
    })
}

/// `points_by_year_given_from` / `points_by_year_given_to` document.
pub fn yearly_document(votes: &YearlyVotes) -> Value {
    json!({
        "year": votes.year,
        "country": votes.country,
        "voted": votes.voted,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rows(pairs: &[(&str, &str)]) -> Vec<RawVoteRow> {
        pairs
            .iter()
            .map(|(c, p)| RawVoteRow { country: Some(c.to_string()), points: Some(p.to_string()) })
            .collect()
    }

    fn votes(country: &str, direction: VoteDirection, year: Year, pairs: &[(&str, &str)]) -> CountryVotes {
        CountryVotes {
            country: country.to_string(),
            direction,
            year,
            rows: rows(pairs),
        }
    }

    fn totals(profile: &CountryVoteProfile) -> Vec<(&str, u64)> {
        profile.counterparts.iter().map(|c| (c.country.as_str(), c.points)).collect()
    }

    #[test]
    fn profile_sums_points_across_years() {
        let parser = RowParser::new().unwrap();
        let mut builder = VoteGraphBuilder::new();
        builder.ingest(&parser, &votes("Cyprus", VoteDirection::Given, 1990, &[("Greece", "12"), ("Malta", "8")]));
        builder.ingest(&parser, &votes("Cyprus", VoteDirection::Given, 1991, &[("Greece", "10"), ("Malta", "12")]));
        let graph = builder.build();

        let profiles = graph.profiles(VoteDirection::Given);
        let cyprus = profiles.iter().find(|p| p.country == "Cyprus").unwrap();
        assert_eq!(totals(cyprus), vec![("Greece", 22), ("Malta", 20)]);
        assert_eq!(graph.edge_count(), 4);
    }

    #[test]
    fn ties_keep_first_seen_order() {
        let parser = RowParser::new().unwrap();
        let mut builder = VoteGraphBuilder::new();
        builder.ingest(
            &parser,
            &votes("Norway", VoteDirection::Given, 2000, &[("Iceland", "5"), ("Sweden", "8"), ("Denmark", "5"), ("Finland", "5")]),
        );
        let graph = builder.build();
        let profiles = graph.profiles(VoteDirection::Given);
        let norway = &profiles[0];
        assert_eq!(
            totals(norway),
            vec![("Sweden", 8), ("Iceland", 5), ("Denmark", 5), ("Finland", 5)]
        );
        assert_eq!(norway.top(TOP_COUNTERPARTS).len(), 4);
        assert_eq!(norway.top(2).len(), 2);
    }

    #[test]
    fn received_rows_address_the_same_edges() {
        let parser = RowParser::new().unwrap();
        let mut builder = VoteGraphBuilder::new();
        builder.ingest(&parser, &votes("Greece", VoteDirection::Given, 2005, &[("Cyprus", "10")]));
        builder.ingest(&parser, &votes("Cyprus", VoteDirection::Received, 2005, &[("Greece", "12")]));
        let graph = builder.build();

        assert_eq!(graph.edge_count(), 1);
        assert_eq!(
            graph.edges(),
            vec![VoteEdge {
                year: 2005,
                source: "Greece".to_string(),
                target: "Cyprus".to_string(),
                points: 12,
            }]
        );
        let received = graph.profiles(VoteDirection::Received);
        let cyprus = received.iter().find(|p| p.country == "Cyprus").unwrap();
        assert_eq!(totals(cyprus), vec![("Greece", 12)]);
    }

    #[test]
    fn malformed_rows_are_dropped_and_counted() {
        let parser = RowParser::new().unwrap();
        let mut builder = VoteGraphBuilder::new();
        builder.ingest(
            &parser,
            &votes("Malta", VoteDirection::Given, 2010, &[("Italy", "7"), ("Spain", ""), ("France", "abc")]),
        );
        let graph = builder.build();
        assert_eq!(graph.edge_count(), 1);
        assert_eq!(graph.tally().parsed, 1);
        assert_eq!(graph.tally().skipped_total(), 2);
        assert!(graph.edges().iter().all(|e| e.target == "Italy"));
    }

    #[test]
    fn self_votes_are_skipped_and_counted() {
        let parser = RowParser::new().unwrap();
        let mut builder = VoteGraphBuilder::new();
        builder.ingest(&parser, &votes("Malta", VoteDirection::Given, 2010, &[("Malta", "12"), ("Italy", "10")]));
        builder.ingest(&parser, &votes("Italy", VoteDirection::Received, 2010, &[("Italy", "8")]));
        let graph = builder.build();

        assert_eq!(graph.edge_count(), 1);
        assert_eq!(graph.tally().skipped.get("self_vote"), Some(&2));
        let profiles = graph.profiles(VoteDirection::Given);
        let malta = profiles.iter().find(|p| p.country == "Malta").unwrap();
        assert_eq!(totals(malta), vec![("Italy", 10)]);
    }

    #[test]
    fn country_without_rows_has_empty_profile() {
        let parser = RowParser::new().unwrap();
        let mut builder = VoteGraphBuilder::new();
        builder.add_country("Andorra");
        builder.ingest(&parser, &votes("Monaco", VoteDirection::Given, 1970, &[]));
        let graph = builder.build();
        let profiles = graph.profiles(VoteDirection::Given);
        assert_eq!(profiles.len(), 2);
        assert!(profiles.iter().all(|p| p.counterparts.is_empty()));
        assert!(profiles[0].favourite().is_none());
    }

    #[test]
    fn yearly_lists_are_ranked_per_country_and_year() {
        let parser = RowParser::new().unwrap();
        let mut builder = VoteGraphBuilder::new();
        builder.ingest(&parser, &votes("Sweden", VoteDirection::Given, 2012, &[("Norway", "6"), ("Finland", "10")]));
        builder.ingest(&parser, &votes("Sweden", VoteDirection::Given, 2011, &[("Norway", "3")]));
        let graph = builder.build();
        let yearly = graph.yearly(VoteDirection::Given);
        assert_eq!(yearly.len(), 2);
        assert_eq!(yearly[0].year, 2011);
        assert_eq!(yearly[1].voted[0].country, "Finland");

        let doc = yearly_document(&yearly[1]);
        assert_eq!(doc["country"], "Sweden");
        assert_eq!(doc["voted"][0]["points"], 10);
    }

    #[test]
    fn profile_document_uses_direction_field_names() {
        let profile = CountryVoteProfile {
            country: "Greece".to_string(),
            counterparts: vec![CounterpartPoints { country: "Cyprus".to_string(), points: 12 }],
        };
        let given = profile_document(&profile, VoteDirection::Given);
        assert_eq!(given["voted_to"][0]["country"], "Cyprus");
        let received = profile_document(&profile, VoteDirection::Received);
        assert_eq!(received["get_votes_from"][0]["points"], 12);
    }
}

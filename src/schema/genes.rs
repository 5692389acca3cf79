//! The core gene universe.
//!
//! Gene indices are positions in the lexicographically sorted, de-duplicated gene list.
//! Every process that loads the same list therefore agrees on gene -> index without
//! coordination, regardless of the order genes appear in any input dataset.

use std::collections::{BTreeSet, HashMap};
use std::path::Path;

use log::debug;

use super::error::SchemaConfigError;
use crate::textio;

/// Gene list shipped with the crate, used when no core gene set is configured.
pub const BUNDLED_GENE_LIST: &str = include_str!("dummy_core_geneset.tsv");

/// One row of the canonical var table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VarEntry<'a> {
    /// Gene symbol
    pub gene: &'a str,
    /// Position in the sorted universe
    pub index: usize,
    /// Ensembl identifier (the symbol when no mapping is available)
    pub ens: &'a str,
}

/// Sorted, duplicate-free set of core genes with index lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneUniverse {
    sorted: Vec<String>,
    index: HashMap<String, usize>,
}

impl GeneUniverse {
    /// Build a universe from any collection of gene names.
    pub fn from_genes<I, S>(genes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let sorted: Vec<String> = genes
            .into_iter()
            .map(Into::into)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let index = sorted
            .iter()
            .enumerate()
            .map(|(i, gene)| (gene.clone(), i))
            .collect();
        Self { sorted, index }
    }

    /// Read a gene list: first tab-separated column, no header, optionally gzipped.
    pub fn from_path(path: &Path) -> Result<Self, SchemaConfigError> {
        let genes = textio::read_first_column(path).map_err(|e| SchemaConfigError::GeneList {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        if genes.is_empty() {
            return Err(SchemaConfigError::EmptyGeneList(path.to_path_buf()));
        }
        let universe = Self::from_genes(genes);
        debug!(
            "Loaded {} core genes from {}",
            universe.num_genes(),
            path.display()
        );
        Ok(universe)
    }

    /// The bundled placeholder gene list.
    pub fn bundled() -> Self {
        Self::from_genes(
            BUNDLED_GENE_LIST
                .lines()
                .filter_map(|line| line.split('\t').next())
                .map(str::trim)
                .filter(|gene| !gene.is_empty()),
        )
    }

    /// Genes in index order.
    pub fn sorted_core_genes(&self) -> &[String] {
        &self.sorted
    }

    /// Number of genes in the universe.
    pub fn num_genes(&self) -> usize {
        self.sorted.len()
    }

    /// Membership test.
    pub fn contains(&self, gene: &str) -> bool {
        self.index.contains_key(gene)
    }

    /// Index of a gene, if it belongs to the universe.
    pub fn index_of(&self, gene: &str) -> Option<usize> {
        self.index.get(gene).copied()
    }

    /// Canonical `(gene, index, ens)` rows.
    pub fn var_table(&self) -> impl Iterator<Item = VarEntry<'_>> {
        self.sorted.iter().enumerate().map(|(index, gene)| VarEntry {
            gene,
            index,
            ens: gene,
        })
    }

    /// Fraction of the universe covered by `genes`.
    pub fn intersection_frac<'a, I>(&self, genes: I) -> f64
    where
        I: IntoIterator<Item = &'a str>,
    {
        if self.sorted.is_empty() {
            return 0.0;
        }
        let hits: BTreeSet<&str> = genes.into_iter().filter(|g| self.contains(g)).collect();
        hits.len() as f64 / self.sorted.len() as f64
    }
}

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ForestParams {
    pub tree_count: usize,
    pub max_depth: usize,
    pub min_leaf_size: usize,
    pub seed: u64,
}

impl Default for ForestParams {
    fn default() -> Self {
        Self {
            tree_count: crate::config::DEFAULT_TREE_COUNT,
            max_depth: 64,
            min_leaf_size: 1,
            seed: crate::config::DEFAULT_FOREST_SEED,
        }
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
enum Node {
    Leaf {
        class: u32,
    },
    Split {
        feature: usize,
        threshold: f32,
        left: usize,
        right: usize,
    },
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
struct DecisionTree {
    nodes: Vec<Node>,
}

impl DecisionTree {
    fn predict(&self, features: &[f32]) -> u32 {
        let mut idx = 0;
        loop {
            match self.nodes[idx] {
                Node::Leaf { class } => return class,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    idx = if features[feature] <= threshold {
                        left
                    } else {
                        right
                    };
                }
            }
        }
    }
}

// Bagged CART ensemble: each tree is fit on a bootstrap sample with
// sqrt-of-features candidate subsampling at every split, and prediction is
// a majority vote. Fitting is deterministic for a fixed seed because every
// tree derives its own rng from the master seed.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct RandomForest {
    params: ForestParams,
    feature_count: usize,
    class_count: usize,
    trees: Vec<DecisionTree>,
}

impl RandomForest {
    pub fn fit(x: &[Vec<f32>], y: &[u32], class_count: usize, params: ForestParams) -> Self {
        assert_eq!(x.len(), y.len(), "feature/label row counts differ");
        assert!(!x.is_empty(), "cannot fit on an empty dataset");
        let feature_count = x[0].len();

        let trees = (0..params.tree_count)
            .map(|tree_idx| {
                let mut rng = StdRng::seed_from_u64(params.seed.wrapping_add(tree_idx as u64));
                let indices: Vec<usize> =
                    (0..x.len()).map(|_| rng.random_range(0..x.len())).collect();
                let mut builder = TreeBuilder {
                    x,
                    y,
                    class_count,
                    params,
                    candidate_features: (feature_count as f32).sqrt().max(1.0) as usize,
                    nodes: Vec::new(),
                };
                builder.build(indices, 0, &mut rng);
                DecisionTree {
                    nodes: builder.nodes,
                }
            })
            .collect();

        Self {
            params,
            feature_count,
            class_count,
            trees,
        }
    }

    pub fn feature_count(&self) -> usize {
        self.feature_count
    }

    pub fn class_count(&self) -> usize {
        self.class_count
    }

    pub fn predict(&self, features: &[f32]) -> u32 {
        argmax(&self.predict_proba(features)) as u32
    }

    // Fraction of trees voting for each class.
    pub fn predict_proba(&self, features: &[f32]) -> Vec<f32> {
        let mut votes = vec![0usize; self.class_count];
        for tree in &self.trees {
            votes[tree.predict(features) as usize] += 1;
        }
        votes
            .into_iter()
            .map(|v| v as f32 / self.trees.len() as f32)
            .collect()
    }
}

// First index of the maximum; ties break toward the lower class index.
fn argmax(values: &[f32]) -> usize {
    let mut best = 0;
    for (i, &v) in values.iter().enumerate() {
        if v > values[best] {
            best = i;
        }
    }
    best
}

struct TreeBuilder<'a> {
    x: &'a [Vec<f32>],
    y: &'a [u32],
    class_count: usize,
    params: ForestParams,
    candidate_features: usize,
    nodes: Vec<Node>,
}

impl TreeBuilder<'_> {
    fn build(&mut self, indices: Vec<usize>, depth: usize, rng: &mut StdRng) -> usize {
        let counts = self.class_counts(&indices);
        let node_idx = self.nodes.len();

        if depth >= self.params.max_depth
            || indices.len() < 2 * self.params.min_leaf_size
            || is_pure(&counts)
        {
            self.nodes.push(Node::Leaf {
                class: majority(&counts),
            });
            return node_idx;
        }

        let Some((feature, threshold)) = self.best_split(&indices, &counts, rng) else {
            self.nodes.push(Node::Leaf {
                class: majority(&counts),
            });
            return node_idx;
        };

        let (left_idx, right_idx): (Vec<usize>, Vec<usize>) = indices
            .into_iter()
            .partition(|&i| self.x[i][feature] <= threshold);

        // Reserve the slot so children land after their parent.
        self.nodes.push(Node::Leaf { class: 0 });
        let left = self.build(left_idx, depth + 1, rng);
        let right = self.build(right_idx, depth + 1, rng);
        self.nodes[node_idx] = Node::Split {
            feature,
            threshold,
            left,
            right,
        };
        node_idx
    }

    fn class_counts(&self, indices: &[usize]) -> Vec<usize> {
        let mut counts = vec![0usize; self.class_count];
        for &i in indices {
            counts[self.y[i] as usize] += 1;
        }
        counts
    }

    // Exhaustive threshold scan over a random feature subset, minimizing
    // weighted Gini impurity.
    fn best_split(
        &self,
        indices: &[usize],
        counts: &[usize],
        rng: &mut StdRng,
    ) -> Option<(usize, f32)> {
        let feature_count = self.x[0].len();
        let mut features: Vec<usize> = (0..feature_count).collect();
        features.shuffle(rng);
        features.truncate(self.candidate_features);

        let total = indices.len();
        let mut best: Option<(usize, f32, f32)> = None;

        for &feature in &features {
            let mut sorted: Vec<(f32, u32)> = indices
                .iter()
                .map(|&i| (self.x[i][feature], self.y[i]))
                .collect();
            sorted.sort_by(|a, b| a.0.total_cmp(&b.0));

            let mut left_counts = vec![0usize; self.class_count];
            let mut right_counts = counts.to_vec();

            for i in 0..total - 1 {
                let class = sorted[i].1 as usize;
                left_counts[class] += 1;
                right_counts[class] -= 1;

                if sorted[i].0 == sorted[i + 1].0 {
                    continue;
                }
                let left_n = i + 1;
                let right_n = total - left_n;
                if left_n < self.params.min_leaf_size || right_n < self.params.min_leaf_size {
                    continue;
                }

                let score = (left_n as f32 * gini(&left_counts, left_n)
                    + right_n as f32 * gini(&right_counts, right_n))
                    / total as f32;
                if best.is_none_or(|(_, _, s)| score < s) {
                    let threshold = (sorted[i].0 + sorted[i + 1].0) / 2.0;
                    best = Some((feature, threshold, score));
                }
            }
        }

        best.map(|(feature, threshold, _)| (feature, threshold))
    }
}

fn gini(counts: &[usize], total: usize) -> f32 {
    let total = total as f32;
    1.0 - counts
        .iter()
        .map(|&c| {
            let p = c as f32 / total;
            p * p
        })
        .sum::<f32>()
}

fn is_pure(counts: &[usize]) -> bool {
    counts.iter().filter(|&&c| c > 0).count() <= 1
}

fn majority(counts: &[usize]) -> u32 {
    let mut best = 0;
    for (class, &count) in counts.iter().enumerate() {
        if count > counts[best] {
            best = class;
        }
    }
    best as u32
}

//! Built-in experiment and group tables.

use crate::{GroupDescriptor, JobDescriptor};

/// Every experiment the harness knows how to launch.
pub const JOBS: &[JobDescriptor] = &[
    // Baselines
    JobDescriptor::new(
        "baseline",
        "baseline_60epoch",
        "baseline_resnet50",
        "Baseline ResNet50 with standard settings",
    ),
    JobDescriptor::new(
        "enhanced_baseline",
        "enhanced_baseline",
        "enhanced_resnet50",
        "Enhanced baseline with improved augmentations",
    ),
    // Architectures
    JobDescriptor::new(
        "densenet",
        "arch_densenet121",
        "arch_densenet121",
        "DenseNet121 architecture comparison",
    ),
    JobDescriptor::new(
        "osnet",
        "arch_osnet",
        "arch_osnet",
        "OSNet architecture comparison",
    ),
    JobDescriptor::new(
        "optimized",
        "optimized_experiment",
        "optimized_osnet",
        "Optimized OSNet with enhanced settings",
    ),
    // Losses
    JobDescriptor::new(
        "triplet",
        "loss_pure_triplet",
        "loss_pure_triplet",
        "Pure triplet loss without cross-entropy",
    ),
    JobDescriptor::new(
        "contrastive",
        "contrastive_loss",
        "contrastive_siamese",
        "Contrastive loss with siamese network",
    ),
    // Sampling
    JobDescriptor::new(
        "sampling",
        "sampling_many_instances",
        "sampling_8instances",
        "Many instances sampling strategy (8 per identity)",
    ),
    JobDescriptor::new(
        "hard_mining",
        "hard_mining_experiment",
        "hard_mining_osnet",
        "Hard negative mining strategy",
    ),
    JobDescriptor::new(
        "advanced",
        "advanced_optimization",
        "advanced_osnet",
        "Advanced optimization techniques",
    ),
    // Ablations
    JobDescriptor::new(
        "margin_01",
        "ablation_margin_01",
        "margin_01",
        "Triplet margin ablation (0.1)",
    ),
    JobDescriptor::new(
        "margin_05",
        "ablation_margin_05",
        "margin_05",
        "Triplet margin ablation (0.5)",
    ),
    // Misc
    JobDescriptor::new(
        "best",
        "best_combination",
        "best_combination",
        "Best combination of all techniques",
    ),
    JobDescriptor::new(
        "cosine",
        "cosine_distance",
        "cosine_distance",
        "Cosine distance metric experiment",
    ),
    JobDescriptor::new(
        "warmup",
        "warmup_experiment",
        "warmup_experiment",
        "Learning rate warmup experiment",
    ),
];

/// Named experiment groups. Group names shadow job selectors of the same name.
pub const GROUPS: &[GroupDescriptor] = &[
    GroupDescriptor::new(
        "core",
        "Essential experiments",
        &[
            "baseline",
            "densenet",
            "osnet",
            "optimized",
            "triplet",
            "contrastive",
            "sampling",
            "hard_mining",
            "margin_01",
            "margin_05",
            "best",
        ],
    ),
    GroupDescriptor::new(
        "architecture",
        "Architecture comparison",
        &["baseline", "densenet", "osnet", "optimized"],
    ),
    GroupDescriptor::new(
        "loss",
        "Loss function comparison",
        &["baseline", "triplet", "contrastive"],
    ),
    GroupDescriptor::new(
        "sampling",
        "Sampling strategy comparison",
        &["baseline", "sampling", "hard_mining", "advanced"],
    ),
    GroupDescriptor::new(
        "ablation",
        "Ablation studies",
        &["baseline", "margin_01", "margin_05"],
    ),
    GroupDescriptor::new(
        "all",
        "All available experiments",
        &[
            "baseline",
            "enhanced_baseline",
            "densenet",
            "osnet",
            "optimized",
            "triplet",
            "contrastive",
            "sampling",
            "hard_mining",
            "advanced",
            "margin_01",
            "margin_05",
            "best",
            "cosine",
            "warmup",
        ],
    ),
    GroupDescriptor::new(
        "quick",
        "Quick test with 3 experiments",
        &["baseline", "osnet", "triplet"],
    ),
    GroupDescriptor::new("baseline_only", "Only baseline experiment", &["baseline"]),
    GroupDescriptor::new("best_only", "Only best combination experiment", &["best"]),
];

//! How-to articles, their steps, and the form input they are built from.

use crate::models::{
    document::DocMeta,
    file_meta::{FileInput, UploadedFileMeta},
};
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum DifficultyLevel {
    Easy,
    Medium,
    Hard,
}

/// A persisted how-to article.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Howto {
    #[serde(flatten)]
    pub meta: DocMeta,

    pub title: String,

    /// Human-readable identifier, unique across the collection.
    pub slug: String,

    pub description: String,

    #[serde(default)]
    pub difficulty_level: Option<DifficultyLevel>,

    /// Free-text duration, e.g. "1-2 weeks".
    #[serde(default)]
    pub time: Option<String>,

    #[serde(default)]
    pub tags: Vec<String>,

    pub cover_image: UploadedFileMeta,

    pub steps: Vec<HowtoStep>,

    #[serde(default)]
    pub files: Vec<UploadedFileMeta>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct HowtoStep {
    pub title: String,
    pub text: String,
    #[serde(default)]
    pub images: Vec<UploadedFileMeta>,
}

/// A submitted article whose blobs have not been uploaded yet.
#[derive(Clone, Debug)]
pub struct HowtoFormInput {
    pub title: String,
    pub slug: String,
    pub description: String,
    pub difficulty_level: Option<DifficultyLevel>,
    pub time: Option<String>,
    pub tags: Vec<String>,
    pub cover_image: FileInput,
    pub steps: Vec<StepFormInput>,
    pub files: Vec<FileInput>,
}

#[derive(Clone, Debug)]
pub struct StepFormInput {
    pub title: String,
    pub text: String,
    pub images: Vec<FileInput>,
}

/// Text fields of a submission, sent as the JSON `values` part of the
/// multipart upload request.
#[derive(Deserialize, Clone, Debug, Default)]
pub struct HowtoValues {
    pub title: String,
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub difficulty_level: Option<DifficultyLevel>,
    #[serde(default)]
    pub time: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub steps: Vec<StepValues>,
}

#[derive(Deserialize, Clone, Debug, Default)]
pub struct StepValues {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub text: String,
}

impl HowtoValues {
    /// Attach the submitted blobs. `step_images[n]` belongs to step `n`;
    /// missing entries mean the step has no images.
    pub fn into_form(
        self,
        cover_image: FileInput,
        mut step_images: Vec<Vec<FileInput>>,
        files: Vec<FileInput>,
    ) -> HowtoFormInput {
        step_images.resize_with(self.steps.len(), Vec::new);
        let steps = self
            .steps
            .into_iter()
            .zip(step_images)
            .map(|(step, images)| StepFormInput {
                title: step.title,
                text: step.text,
                images,
            })
            .collect();
        let slug = self.slug.unwrap_or_else(|| slugify(&self.title));

        HowtoFormInput {
            title: self.title,
            slug,
            description: self.description,
            difficulty_level: self.difficulty_level,
            time: self.time,
            tags: self.tags,
            cover_image,
            steps,
            files,
        }
    }
}

/// Derive a slug from a title: special characters are dropped, words are
/// joined with `-` and the result is lowercased.
pub fn slugify(title: &str) -> String {
    title
        .split_whitespace()
        .map(|word| {
            word.chars()
                .filter(|c| c.is_alphanumeric())
                .collect::<String>()
        })
        .filter(|word| !word.is_empty())
        .collect::<Vec<_>>()
        .join("-")
        .to_lowercase()
}

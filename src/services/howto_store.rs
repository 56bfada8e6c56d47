//! HowtoStore: browsing how-tos and the multi-phase upload workflow.
//!
//! An upload runs its phases strictly in order: cover image, step images
//! (one step at a time, images within a step concurrently), generic files
//! (concurrently), then a single document write. Each finished phase is
//! marked on the per-article [`UploadStatus`], which subscribers observe
//! through a `watch` channel. A failed run deletes every blob it managed to
//! store before the error is returned; the status stays at the last phase
//! that completed.
//!
//! Every blob of a run gets its own numbered directory under
//! `uploads/howtosV1/{id}`, so two files sharing a name never overwrite each
//! other. An id that already carries a published how-to cannot be uploaded
//! to again. Status entries that sit idle longer than the configured TTL are
//! dropped when new ids are reserved.

use crate::{
    models::{
        file_meta::{FileInput, UploadedFileMeta},
        howto::{Howto, HowtoFormInput, HowtoStep, StepFormInput, slugify},
        upload_status::{UploadPhase, UploadStatus},
    },
    services::{
        document_store::{DocumentError, DocumentStore},
        object_store::{ObjectStore, StorageError},
    },
};
use futures::future::try_join_all;
use serde_json::Value;
use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex, MutexGuard, PoisonError,
        atomic::{AtomicUsize, Ordering},
    },
    time::{Duration, Instant},
};
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, info, warn};

pub const HOWTO_COLLECTION: &str = "howtosV1";
pub const UPLOAD_ROOT: &str = "uploads";

/// How long an idle upload status stays observable.
pub const UPLOAD_STATUS_TTL: Duration = Duration::from_secs(60 * 60);

pub const TITLE_REQUIRED: &str = "A title for your how-to is required";
pub const TITLE_NOT_UNIQUE: &str = "How-to titles must be unique, please try being more specific";

#[derive(Debug, Error)]
pub enum HowtoError {
    #[error("{0}")]
    Validation(String),
    #[error("slug `{0}` is already taken")]
    SlugTaken(String),
    #[error("an upload for how-to `{0}` is already running")]
    UploadInProgress(String),
    #[error("how-to `{0}` is already published")]
    AlreadyPublished(String),
    #[error("upload failed during {phase}: {source}")]
    Upload {
        phase: UploadPhase,
        #[source]
        source: StorageError,
    },
    #[error("database write failed: {0}")]
    Database(#[source] DocumentError),
    #[error(transparent)]
    Document(#[from] DocumentError),
    #[error("malformed how-to document: {0}")]
    Malformed(#[from] serde_json::Error),
}

pub type HowtoResult<T> = Result<T, HowtoError>;

/// Shared handle to the how-to collection and its upload workflow.
#[derive(Clone)]
pub struct HowtoStore {
    inner: Arc<Inner>,
}

struct Inner {
    docs: Arc<dyn DocumentStore>,
    objects: Arc<dyn ObjectStore>,
    status_ttl: Duration,
    all_howtos: watch::Sender<Vec<Howto>>,
    active_howto: watch::Sender<Option<Howto>>,
    uploads: Mutex<HashMap<String, UploadEntry>>,
}

struct UploadEntry {
    status: Arc<watch::Sender<UploadStatus>>,
    running: bool,
    touched: Instant,
}

impl UploadEntry {
    fn idle() -> Self {
        Self {
            status: Arc::new(watch::Sender::new(UploadStatus::default())),
            running: false,
            touched: Instant::now(),
        }
    }
}

impl HowtoStore {
    pub fn new(docs: Arc<dyn DocumentStore>, objects: Arc<dyn ObjectStore>) -> Self {
        Self::with_status_ttl(docs, objects, UPLOAD_STATUS_TTL)
    }

    /// Like [`Self::new`], keeping idle upload statuses for `status_ttl`.
    pub fn with_status_ttl(
        docs: Arc<dyn DocumentStore>,
        objects: Arc<dyn ObjectStore>,
        status_ttl: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                docs,
                objects,
                status_ttl,
                all_howtos: watch::Sender::new(Vec::new()),
                active_howto: watch::Sender::new(None),
                uploads: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Every how-to, newest first. Subscribers of [`Self::subscribe_list`]
    /// see the refreshed list.
    pub async fn get_doc_list(&self) -> HowtoResult<Vec<Howto>> {
        let docs = self
            .inner
            .docs
            .list_ordered(HOWTO_COLLECTION, "_created", true)
            .await?;
        let howtos = docs
            .into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<Howto>, _>>()?;

        self.inner.all_howtos.send_replace(howtos.clone());
        Ok(howtos)
    }

    /// Look a how-to up by slug and make it the active one (or clear the
    /// active how-to when nothing matches).
    pub async fn get_doc_by_slug(&self, slug: &str) -> HowtoResult<Option<Howto>> {
        let docs = self
            .inner
            .docs
            .query_eq(HOWTO_COLLECTION, "slug", slug, 1)
            .await?;
        let howto = docs
            .into_iter()
            .next()
            .map(serde_json::from_value::<Howto>)
            .transpose()?;

        self.inner.active_howto.send_replace(howto.clone());
        Ok(howto)
    }

    /// Reserve an identifier for a new how-to. Its upload status can be
    /// subscribed to right away.
    pub fn generate_id(&self) -> String {
        let id = self.inner.docs.generate_id(HOWTO_COLLECTION);
        let mut uploads = self.lock_uploads();
        evict_idle(&mut uploads, self.inner.status_ttl);
        uploads.entry(id.clone()).or_insert_with(UploadEntry::idle);
        id
    }

    pub async fn is_slug_unique(&self, slug: &str) -> HowtoResult<()> {
        if self
            .inner
            .docs
            .check_slug_unique(HOWTO_COLLECTION, slug)
            .await?
        {
            Ok(())
        } else {
            Err(HowtoError::Validation(TITLE_NOT_UNIQUE.into()))
        }
    }

    /// Check a proposed title and return the slug derived from it.
    pub async fn validate_title(&self, title: &str) -> HowtoResult<String> {
        let slug = slugify(title);
        if slug.is_empty() {
            return Err(HowtoError::Validation(TITLE_REQUIRED.into()));
        }
        self.is_slug_unique(&slug).await?;
        Ok(slug)
    }

    pub fn all_howtos(&self) -> Vec<Howto> {
        self.inner.all_howtos.borrow().clone()
    }

    pub fn active_howto(&self) -> Option<Howto> {
        self.inner.active_howto.borrow().clone()
    }

    pub fn subscribe_list(&self) -> watch::Receiver<Vec<Howto>> {
        self.inner.all_howtos.subscribe()
    }

    pub fn subscribe_active(&self) -> watch::Receiver<Option<Howto>> {
        self.inner.active_howto.subscribe()
    }

    /// Current status of the upload for `id`, if the id is known.
    pub fn upload_status(&self, id: &str) -> Option<UploadStatus> {
        self.lock_uploads()
            .get(id)
            .map(|entry| *entry.status.borrow())
    }

    pub fn subscribe_upload(&self, id: &str) -> Option<watch::Receiver<UploadStatus>> {
        self.lock_uploads()
            .get(id)
            .map(|entry| entry.status.subscribe())
    }

    /// Upload every blob referenced by `form`, then persist the how-to as a
    /// single document keyed by `id`.
    ///
    /// On success the how-to becomes the active one. On failure the blobs
    /// already stored by this run are deleted and the error is returned.
    /// Ids that already carry a published how-to are refused.
    pub async fn upload_howto(
        &self,
        form: HowtoFormInput,
        id: &str,
        owner: &str,
    ) -> HowtoResult<Howto> {
        validate_form(&form)?;
        if self.is_published(id).await? {
            return Err(HowtoError::AlreadyPublished(id.to_string()));
        }
        let run = self.begin_upload(id)?;
        info!(howto_id = %id, slug = %form.slug, "uploading how-to");

        let ledger = UploadLedger::default();
        match self.run_upload(form, id, owner, &run, &ledger).await {
            Ok(howto) => {
                info!(howto_id = %id, "how-to upload complete");
                self.inner.active_howto.send_replace(Some(howto.clone()));
                Ok(howto)
            }
            Err(err) => {
                let last_phase = run.status.borrow().last_completed();
                warn!(
                    howto_id = %id,
                    last_phase = ?last_phase,
                    error = %err,
                    "how-to upload aborted"
                );
                self.discard_uploads(ledger.take()).await;
                Err(err)
            }
        }
    }

    async fn run_upload(
        &self,
        form: HowtoFormInput,
        id: &str,
        owner: &str,
        run: &UploadRun,
        ledger: &UploadLedger,
    ) -> HowtoResult<Howto> {
        let HowtoFormInput {
            title,
            slug,
            description,
            difficulty_level,
            time,
            tags,
            cover_image,
            steps,
            files,
        } = form;
        let folder = self.upload_folder(id);

        let cover_image = self
            .upload_file(&folder, ledger.next_slot(), &cover_image, ledger)
            .await
            .map_err(|source| HowtoError::Upload {
                phase: UploadPhase::Cover,
                source,
            })?;
        run.mark(UploadPhase::Cover);

        let steps = self
            .process_steps(steps, &folder, ledger)
            .await
            .map_err(|source| HowtoError::Upload {
                phase: UploadPhase::StepImages,
                source,
            })?;
        run.mark(UploadPhase::StepImages);

        let files = self
            .upload_batch(&folder, &files, ledger)
            .await
            .map_err(|source| HowtoError::Upload {
                phase: UploadPhase::Files,
                source,
            })?;
        run.mark(UploadPhase::Files);

        let meta = self
            .inner
            .docs
            .generate_doc_meta(HOWTO_COLLECTION, id, owner);
        let howto = Howto {
            meta,
            title,
            slug,
            description,
            difficulty_level,
            time,
            tags,
            cover_image,
            steps,
            files,
        };
        self.update_database(&howto).await?;
        run.mark(UploadPhase::Database);
        run.mark(UploadPhase::Complete);

        Ok(howto)
    }

    /// Steps go one at a time so that a failure stops before later steps are
    /// touched.
    async fn process_steps(
        &self,
        steps: Vec<StepFormInput>,
        folder: &str,
        ledger: &UploadLedger,
    ) -> Result<Vec<HowtoStep>, StorageError> {
        let mut processed = Vec::with_capacity(steps.len());
        for (index, step) in steps.into_iter().enumerate() {
            debug!(step = index, images = step.images.len(), "uploading step images");
            let images = self.upload_batch(folder, &step.images, ledger).await?;
            processed.push(HowtoStep {
                title: step.title,
                text: step.text,
                images,
            });
        }
        Ok(processed)
    }

    /// Upload concurrently; results line up with `files`, not with
    /// completion order.
    async fn upload_batch(
        &self,
        folder: &str,
        files: &[FileInput],
        ledger: &UploadLedger,
    ) -> Result<Vec<UploadedFileMeta>, StorageError> {
        try_join_all(files.iter().map(|file| {
            let slot = ledger.next_slot();
            self.upload_file(folder, slot, file, ledger)
        }))
        .await
    }

    /// Store one blob at `{folder}/{slot}/{name}`.
    async fn upload_file(
        &self,
        folder: &str,
        slot: usize,
        file: &FileInput,
        ledger: &UploadLedger,
    ) -> Result<UploadedFileMeta, StorageError> {
        let folder = format!("{}/{}", folder, slot);
        debug!(%folder, name = %file.name, size = file.data.len(), "uploading file");
        let meta = self
            .inner
            .objects
            .upload(&folder, &file.name, file.data.clone(), file.content_type())
            .await?;
        ledger.record(&meta);
        Ok(meta)
    }

    async fn update_database(&self, howto: &Howto) -> HowtoResult<()> {
        let doc: Value = serde_json::to_value(howto)?;
        self.inner
            .docs
            .set_doc(HOWTO_COLLECTION, &howto.meta.id, &doc)
            .await
            .map_err(|err| match err {
                DocumentError::SlugTaken { slug, .. } => HowtoError::SlugTaken(slug),
                other => HowtoError::Database(other),
            })
    }

    async fn is_published(&self, id: &str) -> HowtoResult<bool> {
        let docs = self
            .inner
            .docs
            .query_eq(HOWTO_COLLECTION, "_id", id, 1)
            .await?;
        Ok(!docs.is_empty())
    }

    /// Best-effort removal of blobs stored by an aborted run.
    async fn discard_uploads(&self, uploaded: Vec<String>) {
        for path in uploaded {
            match self.inner.objects.delete(&path).await {
                Ok(()) => debug!(%path, "removed orphaned upload"),
                Err(err) => warn!(%path, error = %err, "failed to remove orphaned upload"),
            }
        }
    }

    fn upload_folder(&self, id: &str) -> String {
        format!("{}/{}/{}", UPLOAD_ROOT, HOWTO_COLLECTION, id)
    }

    /// Claim the upload slot for `id` and reset its status to all-false.
    fn begin_upload(&self, id: &str) -> HowtoResult<UploadRun> {
        let mut uploads = self.lock_uploads();
        let entry = uploads
            .entry(id.to_string())
            .or_insert_with(UploadEntry::idle);
        if entry.running {
            return Err(HowtoError::UploadInProgress(id.to_string()));
        }
        if entry.status.borrow().is_complete() {
            return Err(HowtoError::AlreadyPublished(id.to_string()));
        }
        entry.running = true;
        entry.touched = Instant::now();
        entry.status.send_replace(UploadStatus::default());

        Ok(UploadRun {
            store: self.clone(),
            id: id.to_string(),
            status: entry.status.clone(),
        })
    }

    fn lock_uploads(&self) -> MutexGuard<'_, HashMap<String, UploadEntry>> {
        self.inner
            .uploads
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// Drop status entries nobody has touched for `ttl`. Running uploads stay.
fn evict_idle(uploads: &mut HashMap<String, UploadEntry>, ttl: Duration) {
    let before = uploads.len();
    uploads.retain(|_, entry| entry.running || entry.touched.elapsed() < ttl);
    let evicted = before - uploads.len();
    if evicted > 0 {
        debug!(evicted, "dropped idle upload statuses");
    }
}

fn validate_form(form: &HowtoFormInput) -> HowtoResult<()> {
    if form.title.trim().is_empty() {
        return Err(HowtoError::Validation(TITLE_REQUIRED.into()));
    }
    if form.slug.trim().is_empty() {
        return Err(HowtoError::Validation("A slug for your how-to is required".into()));
    }
    Ok(())
}

/// A running upload. Releases the upload slot when dropped, including when
/// the workflow future itself is dropped part way.
struct UploadRun {
    store: HowtoStore,
    id: String,
    status: Arc<watch::Sender<UploadStatus>>,
}

impl UploadRun {
    fn mark(&self, phase: UploadPhase) {
        info!(howto_id = %self.id, phase = %phase, "upload phase complete");
        self.status.send_modify(|status| status.mark(phase));
    }
}

impl Drop for UploadRun {
    fn drop(&mut self) {
        if let Some(entry) = self.store.lock_uploads().get_mut(&self.id) {
            entry.running = false;
            entry.touched = Instant::now();
        }
    }
}

/// Paths of the blobs stored during one run.
#[derive(Default)]
struct UploadLedger {
    paths: Mutex<Vec<String>>,
    slots: AtomicUsize,
}

impl UploadLedger {
    fn next_slot(&self) -> usize {
        self.slots.fetch_add(1, Ordering::Relaxed)
    }

    fn record(&self, meta: &UploadedFileMeta) {
        self.paths
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(meta.full_path.clone());
    }

    fn take(&self) -> Vec<String> {
        std::mem::take(&mut *self.paths.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        db::test_pool,
        services::{
            sqlite_document_store::SqliteDocumentStore,
            testing::{FakeObjectStore, MemoryDocumentStore},
        },
    };

    fn file(name: &str) -> FileInput {
        FileInput::new(name, Some("image/jpeg".into()), name.as_bytes().to_vec())
    }

    fn form(title: &str, steps: &[&[&str]], files: &[&str]) -> HowtoFormInput {
        HowtoFormInput {
            title: title.to_string(),
            slug: slugify(title),
            description: "Turn plastic waste into bricks".into(),
            difficulty_level: None,
            time: Some("1-2 weeks".into()),
            tags: vec!["extrusion".into()],
            cover_image: file("cover.jpg"),
            steps: steps
                .iter()
                .enumerate()
                .map(|(i, images)| StepFormInput {
                    title: format!("Step {}", i + 1),
                    text: "Do the thing".into(),
                    images: images.iter().map(|name| file(name)).collect(),
                })
                .collect(),
            files: files.iter().map(|name| file(name)).collect(),
        }
    }

    fn setup(
        docs: MemoryDocumentStore,
        objects: FakeObjectStore,
    ) -> (HowtoStore, Arc<MemoryDocumentStore>, Arc<FakeObjectStore>) {
        let docs = Arc::new(docs);
        let objects = Arc::new(objects);
        let store = HowtoStore::new(docs.clone(), objects.clone());
        (store, docs, objects)
    }

    #[tokio::test]
    async fn upload_resolves_every_descriptor() {
        let (store, docs, _objects) = setup(MemoryDocumentStore::default(), FakeObjectStore::default());
        let id = store.generate_id();
        let mut status_rx = store.subscribe_upload(&id).unwrap();

        let howto = store
            .upload_howto(
                form("Brick Press", &[&["s1.jpg"], &[]], &["plans.pdf"]),
                &id,
                "maker-42",
            )
            .await
            .unwrap();

        assert_eq!(howto.steps.len(), 2);
        assert_eq!(howto.steps[0].images.len(), 1);
        assert_eq!(howto.steps[1].images.len(), 0);
        assert_eq!(howto.files.len(), 1);
        assert_eq!(howto.meta.id, id);
        assert_eq!(howto.meta.created_by, "maker-42");
        assert!(!howto.meta.deleted);

        let folder = format!("uploads/howtosV1/{id}/");
        assert!(howto.cover_image.full_path.starts_with(&folder));
        assert!(howto.steps[0].images[0].full_path.starts_with(&folder));
        assert_eq!(howto.files[0].name, "plans.pdf");

        let status = store.upload_status(&id).unwrap();
        for phase in UploadPhase::ALL {
            assert!(status.is_done(phase), "{phase} should be done");
        }
        assert!(status_rx.has_changed().unwrap());
        assert!(status_rx.borrow_and_update().is_complete());

        let stored: Howto = serde_json::from_value(docs.get("howtosV1", &id).unwrap()).unwrap();
        assert_eq!(stored, howto);
        assert_eq!(store.active_howto(), Some(howto));
    }

    #[tokio::test]
    async fn batch_results_follow_input_order() {
        let objects = FakeObjectStore::with_delays(&[("a.jpg", 30), ("b.jpg", 15), ("c.jpg", 0)]);
        let (store, _docs, objects) = setup(MemoryDocumentStore::default(), objects);
        let id = store.generate_id();

        let howto = store
            .upload_howto(
                form("Sheet Press", &[&["a.jpg", "b.jpg", "c.jpg"], &["d.jpg"]], &[]),
                &id,
                "maker",
            )
            .await
            .unwrap();

        let names: Vec<_> = howto.steps[0].images.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, ["a.jpg", "b.jpg", "c.jpg"]);
        assert_eq!(howto.steps[0].title, "Step 1");
        assert_eq!(howto.steps[1].title, "Step 2");
        assert_eq!(howto.steps[1].images[0].name, "d.jpg");

        let completed = objects.completed();
        assert_eq!(&completed[1..4], ["c.jpg", "b.jpg", "a.jpg"]);
    }

    #[tokio::test]
    async fn cover_failure_stops_before_anything_else() {
        let (store, docs, objects) = setup(
            MemoryDocumentStore::default(),
            FakeObjectStore::failing_on("cover.jpg"),
        );
        let id = store.generate_id();

        let err = store
            .upload_howto(form("Injector", &[&["s1.jpg"]], &["f.pdf"]), &id, "maker")
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            HowtoError::Upload {
                phase: UploadPhase::Cover,
                ..
            }
        ));
        assert!(objects.uploaded().is_empty());
        assert_eq!(docs.writes.load(Ordering::SeqCst), 0);
        assert_eq!(store.upload_status(&id), Some(UploadStatus::default()));
        assert_eq!(store.active_howto(), None);
    }

    #[tokio::test]
    async fn step_failure_skips_later_steps_and_cleans_up() {
        let (store, docs, objects) = setup(
            MemoryDocumentStore::default(),
            FakeObjectStore::failing_on("bad.jpg"),
        );
        let id = store.generate_id();

        let err = store
            .upload_howto(
                form("Shredder", &[&["s1.jpg"], &["bad.jpg"], &["s3.jpg"]], &["f.pdf"]),
                &id,
                "maker",
            )
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            HowtoError::Upload {
                phase: UploadPhase::StepImages,
                ..
            }
        ));
        let folder = format!("uploads/howtosV1/{id}");
        let expected = vec![format!("{folder}/0/cover.jpg"), format!("{folder}/1/s1.jpg")];
        assert_eq!(objects.uploaded(), expected);
        assert_eq!(objects.deleted(), expected);
        assert_eq!(docs.writes.load(Ordering::SeqCst), 0);

        let status = store.upload_status(&id).unwrap();
        assert!(status.is_done(UploadPhase::Cover));
        assert!(!status.is_done(UploadPhase::StepImages));
        assert_eq!(status.last_completed(), Some(UploadPhase::Cover));
    }

    #[tokio::test]
    async fn database_failure_removes_uploaded_blobs() {
        let (store, docs, objects) = setup(
            MemoryDocumentStore::failing_writes(),
            FakeObjectStore::default(),
        );
        let id = store.generate_id();

        let err = store
            .upload_howto(form("Extruder", &[&["s1.jpg"]], &["f.pdf"]), &id, "maker")
            .await
            .unwrap_err();

        assert!(matches!(err, HowtoError::Database(_)));
        assert_eq!(docs.writes.load(Ordering::SeqCst), 1);
        assert_eq!(objects.deleted().len(), 3);

        let status = store.upload_status(&id).unwrap();
        assert_eq!(status.last_completed(), Some(UploadPhase::Files));
        assert!(!status.is_done(UploadPhase::Database));
    }

    #[tokio::test]
    async fn slug_uniqueness_and_title_validation() {
        let (store, docs, _objects) = setup(MemoryDocumentStore::default(), FakeObjectStore::default());
        docs.insert("howtosV1", "x", serde_json::json!({"slug": "brick-press"}));

        let err = store.is_slug_unique("brick-press").await.unwrap_err();
        assert!(matches!(err, HowtoError::Validation(ref msg) if msg == TITLE_NOT_UNIQUE));
        store.is_slug_unique("shredder").await.unwrap();

        let err = store.validate_title("   ").await.unwrap_err();
        assert!(matches!(err, HowtoError::Validation(ref msg) if msg == TITLE_REQUIRED));
        assert!(store.validate_title("Brick Press!").await.is_err());
        assert_eq!(store.validate_title("Shredder Pro").await.unwrap(), "shredder-pro");
    }

    #[tokio::test]
    async fn rejects_form_without_title() {
        let (store, docs, objects) = setup(MemoryDocumentStore::default(), FakeObjectStore::default());
        let id = store.generate_id();

        let err = store
            .upload_howto(form("  ", &[], &[]), &id, "maker")
            .await
            .unwrap_err();

        assert!(matches!(err, HowtoError::Validation(_)));
        assert!(objects.uploaded().is_empty());
        assert_eq!(docs.writes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn concurrent_submission_for_same_id_is_rejected() {
        let objects = FakeObjectStore::with_delays(&[("cover.jpg", 20)]);
        let (store, _docs, _objects) = setup(MemoryDocumentStore::default(), objects);
        let id = store.generate_id();

        let (first, second) = tokio::join!(
            store.upload_howto(form("Mould", &[], &[]), &id, "maker"),
            store.upload_howto(form("Mould", &[], &[]), &id, "maker"),
        );

        first.unwrap();
        assert!(matches!(second, Err(HowtoError::UploadInProgress(ref dup)) if dup == &id));

        // the slot is released; the id is now simply taken
        let err = store
            .upload_howto(form("Mould", &[], &[]), &id, "maker")
            .await
            .unwrap_err();
        assert!(matches!(err, HowtoError::AlreadyPublished(_)));
    }

    #[tokio::test]
    async fn browsing_publishes_to_subscribers() {
        let (store, _docs, _objects) = setup(MemoryDocumentStore::default(), FakeObjectStore::default());
        let mut list_rx = store.subscribe_list();
        let mut active_rx = store.subscribe_active();

        let id = store.generate_id();
        let howto = store
            .upload_howto(form("Beam Mould", &[&[]], &[]), &id, "maker")
            .await
            .unwrap();
        assert!(active_rx.has_changed().unwrap());
        active_rx.mark_unchanged();

        let list = store.get_doc_list().await.unwrap();
        assert_eq!(list, vec![howto.clone()]);
        assert!(list_rx.has_changed().unwrap());
        assert_eq!(*list_rx.borrow_and_update(), list);
        assert_eq!(store.all_howtos(), list);

        let found = store.get_doc_by_slug("beam-mould").await.unwrap();
        assert_eq!(found, Some(howto));

        assert_eq!(store.get_doc_by_slug("missing").await.unwrap(), None);
        assert!(active_rx.has_changed().unwrap());
        assert_eq!(*active_rx.borrow(), None);
    }

    #[tokio::test]
    async fn same_named_files_get_distinct_paths() {
        let (store, _docs, _objects) = setup(MemoryDocumentStore::default(), FakeObjectStore::default());
        let id = store.generate_id();

        let howto = store
            .upload_howto(
                form("Sorting Table", &[&["image.jpg", "image.jpg"]], &["image.jpg"]),
                &id,
                "maker",
            )
            .await
            .unwrap();

        let mut paths = vec![howto.cover_image.full_path.clone()];
        paths.extend(howto.steps[0].images.iter().map(|m| m.full_path.clone()));
        paths.extend(howto.files.iter().map(|m| m.full_path.clone()));
        let folder = format!("uploads/howtosV1/{id}");
        assert_eq!(
            paths,
            [
                format!("{folder}/0/cover.jpg"),
                format!("{folder}/1/image.jpg"),
                format!("{folder}/2/image.jpg"),
                format!("{folder}/3/image.jpg"),
            ]
        );
        assert!(howto.steps[0].images.iter().all(|m| m.name == "image.jpg"));
    }

    #[tokio::test]
    async fn published_id_cannot_be_uploaded_again() {
        let (store, docs, objects) = setup(
            MemoryDocumentStore::default(),
            FakeObjectStore::failing_on("bad.pdf"),
        );
        let id = store.generate_id();
        let first = store
            .upload_howto(form("Brick Press", &[&["s1.jpg"]], &[]), &id, "maker")
            .await
            .unwrap();

        let err = store
            .upload_howto(form("Other Title", &[], &["bad.pdf"]), &id, "maker")
            .await
            .unwrap_err();
        assert!(matches!(err, HowtoError::AlreadyPublished(ref dup) if dup == &id));
        assert!(objects.deleted().is_empty());
        assert_eq!(objects.uploaded().len(), 2);
        assert!(store.upload_status(&id).unwrap().is_complete());

        let found = store.get_doc_by_slug("brick-press").await.unwrap();
        assert_eq!(found, Some(first));

        // the published document is enough even once the status is gone
        let fresh = HowtoStore::new(docs.clone(), objects.clone());
        let err = fresh
            .upload_howto(form("Other Title", &[], &[]), &id, "maker")
            .await
            .unwrap_err();
        assert!(matches!(err, HowtoError::AlreadyPublished(_)));
        assert_eq!(docs.writes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn slug_taken_at_write_time_cleans_up_second_run() {
        let docs = Arc::new(SqliteDocumentStore::new(Arc::new(test_pool().await)));
        let objects = Arc::new(FakeObjectStore::default());
        let store = HowtoStore::new(docs, objects.clone());

        let first_id = store.generate_id();
        let second_id = store.generate_id();
        let first = store
            .upload_howto(form("Brick Press", &[&["a.jpg"]], &[]), &first_id, "maker")
            .await
            .unwrap();

        // both runs passed the uniqueness check before either wrote
        let err = store
            .upload_howto(form("Brick Press", &[&["b.jpg"]], &["f.pdf"]), &second_id, "other")
            .await
            .unwrap_err();
        assert!(matches!(err, HowtoError::SlugTaken(ref slug) if slug == "brick-press"));

        let second_folder = format!("uploads/howtosV1/{second_id}/");
        let second_paths: Vec<_> = objects
            .uploaded()
            .into_iter()
            .filter(|path| path.starts_with(&second_folder))
            .collect();
        assert_eq!(second_paths.len(), 3);
        assert_eq!(objects.deleted(), second_paths);

        let status = store.upload_status(&second_id).unwrap();
        assert_eq!(status.last_completed(), Some(UploadPhase::Files));

        let found = store.get_doc_by_slug("brick-press").await.unwrap();
        assert_eq!(found, Some(first));
        assert_eq!(store.get_doc_list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn idle_statuses_are_evicted_on_reserve() {
        let docs = Arc::new(MemoryDocumentStore::default());
        let objects = Arc::new(FakeObjectStore::default());
        let store = HowtoStore::with_status_ttl(docs, objects, Duration::ZERO);

        let reserved = store.generate_id();
        let finished = store.generate_id();
        assert!(store.upload_status(&reserved).is_none());
        store
            .upload_howto(form("Mould", &[], &[]), &finished, "maker")
            .await
            .unwrap();
        assert!(store.upload_status(&finished).unwrap().is_complete());

        let running = store.generate_id();
        let run = store.begin_upload(&running).unwrap();
        let latest = store.generate_id();

        assert!(store.upload_status(&finished).is_none());
        assert!(store.upload_status(&running).is_some());
        assert!(store.upload_status(&latest).is_some());

        drop(run);
        store.generate_id();
        assert!(store.upload_status(&running).is_none());
    }

    #[tokio::test]
    async fn statuses_survive_within_ttl() {
        let (store, _docs, _objects) = setup(MemoryDocumentStore::default(), FakeObjectStore::default());
        let ids: Vec<_> = (0..3).map(|_| store.generate_id()).collect();
        for id in &ids {
            assert!(store.upload_status(id).is_some());
        }
    }

    #[test]
    fn unknown_upload_id_has_no_status() {
        let (store, _docs, _objects) = setup(MemoryDocumentStore::default(), FakeObjectStore::default());
        assert!(store.upload_status("nope").is_none());
        assert!(store.subscribe_upload("nope").is_none());
    }
}

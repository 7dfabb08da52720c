//! Projects, their files, and the per-project activity log.

use codeverse_core::{unix_now, ActivityEntry, ActivityKind, Project, ProjectFile};
use rocksdb::WriteBatch;
use uuid::Uuid;

use crate::error::StoreError;
use crate::rocks::{
    compound_key, decode, encode, uuid_at, AppStore, CF_ACTIVITY, CF_FILES, CF_MEMBERS, CF_OWNERS,
    CF_PROJECTS, CF_ROOMS,
};

impl AppStore {
    // ─── Projects ─────────────────────────────────────────────────────

    /// Persist a new project and log its creation.
    pub fn create_project(&self, project: &Project, actor: Uuid) -> Result<(), StoreError> {
        let _guard = self.lock()?;
        if self.exists(CF_PROJECTS, project.id.as_bytes())? {
            return Err(StoreError::Conflict(format!("project exists: {}", project.id)));
        }

        let mut batch = WriteBatch::default();
        batch.put_cf(self.cf(CF_PROJECTS)?, project.id.as_bytes(), encode(project)?);
        batch.put_cf(
            self.cf(CF_OWNERS)?,
            compound_key(&[project.owner.as_bytes(), project.id.as_bytes()]),
            b"",
        );
        self.stage_activity(
            &mut batch,
            project.id,
            Some(actor),
            ActivityKind::ProjectCreated { name: project.name.clone() },
        )?;
        self.write(batch)?;

        log::info!("Created project {} for {}", project.id, project.owner);
        Ok(())
    }

    pub fn get_project(&self, project_id: Uuid) -> Result<Option<Project>, StoreError> {
        self.get_value(CF_PROJECTS, project_id.as_bytes())
    }

    /// Projects owned by `owner`, oldest first.
    pub fn list_projects(&self, owner: Uuid) -> Result<Vec<Project>, StoreError> {
        let mut projects = Vec::new();
        for (key, _) in self.scan_prefix(CF_OWNERS, owner.as_bytes())? {
            let project_id = uuid_at(&key, 16, CF_OWNERS)?;
            match self.get_project(project_id)? {
                Some(project) => projects.push(project),
                None => log::warn!("Owner index points at missing project {project_id}"),
            }
        }
        projects.sort_by_key(|p| (p.created_at, p.id));
        Ok(projects)
    }

    /// Delete a project with all its files, room bindings and activity.
    pub fn delete_project(&self, project_id: Uuid) -> Result<Project, StoreError> {
        let _guard = self.lock()?;
        let project = self
            .get_project(project_id)?
            .ok_or_else(|| StoreError::not_found("project", project_id))?;

        let mut batch = WriteBatch::default();
        for file in self.files_of(project_id)? {
            batch.delete_cf(self.cf(CF_FILES)?, file.id.as_bytes());
            batch.delete_cf(self.cf(CF_ROOMS)?, file.room_id.as_bytes());
            batch.delete_cf(
                self.cf(CF_MEMBERS)?,
                compound_key(&[project_id.as_bytes(), file.id.as_bytes()]),
            );
        }
        for (key, _) in self.scan_prefix(CF_ACTIVITY, project_id.as_bytes())? {
            batch.delete_cf(self.cf(CF_ACTIVITY)?, &key);
        }
        batch.delete_cf(
            self.cf(CF_OWNERS)?,
            compound_key(&[project.owner.as_bytes(), project_id.as_bytes()]),
        );
        batch.delete_cf(self.cf(CF_PROJECTS)?, project_id.as_bytes());
        self.write(batch)?;

        log::info!("Deleted project {project_id}");
        Ok(project)
    }

    // ─── Files ────────────────────────────────────────────────────────

    /// Add a file to its project. Returns the project with updated counters.
    pub fn create_file(&self, file: &ProjectFile, actor: Uuid) -> Result<Project, StoreError> {
        let _guard = self.lock()?;
        let mut project = self
            .get_project(file.project_id)?
            .ok_or_else(|| StoreError::not_found("project", file.project_id))?;

        if self
            .files_of(file.project_id)?
            .iter()
            .any(|f| f.filename == file.filename)
        {
            return Err(StoreError::Conflict(format!("file exists: {}", file.filename)));
        }

        project.files_count += 1;
        project.lines_of_code += file.lines;

        let mut batch = WriteBatch::default();
        batch.put_cf(self.cf(CF_FILES)?, file.id.as_bytes(), encode(file)?);
        batch.put_cf(
            self.cf(CF_MEMBERS)?,
            compound_key(&[file.project_id.as_bytes(), file.id.as_bytes()]),
            b"",
        );
        batch.put_cf(self.cf(CF_ROOMS)?, file.room_id.as_bytes(), file.id.as_bytes());
        batch.put_cf(
            self.cf(CF_PROJECTS)?,
            project.id.as_bytes(),
            encode(&project)?,
        );
        self.stage_activity(
            &mut batch,
            project.id,
            Some(actor),
            ActivityKind::FileCreated { filename: file.filename.clone() },
        )?;
        self.write(batch)?;

        log::debug!("Created file {} in project {}", file.id, project.id);
        Ok(project)
    }

    pub fn get_file(&self, file_id: Uuid) -> Result<Option<ProjectFile>, StoreError> {
        self.get_value(CF_FILES, file_id.as_bytes())
    }

    /// Files of a project, oldest first.
    pub fn list_files(&self, project_id: Uuid) -> Result<Vec<ProjectFile>, StoreError> {
        let mut files = self.files_of(project_id)?;
        files.sort_by_key(|f| (f.created_at, f.id));
        Ok(files)
    }

    /// Resolve the file bound to a sync room.
    pub fn find_file_by_room(&self, room_id: Uuid) -> Result<Option<ProjectFile>, StoreError> {
        let Some(file_id) = self.db.get_cf(self.cf(CF_ROOMS)?, room_id.as_bytes())? else {
            return Ok(None);
        };
        let file_id = uuid_at(&file_id, 0, CF_ROOMS)?;
        self.get_file(file_id)
    }

    /// Remove a file from a project. Returns the removed file.
    pub fn delete_file(
        &self,
        project_id: Uuid,
        file_id: Uuid,
        actor: Uuid,
    ) -> Result<ProjectFile, StoreError> {
        let _guard = self.lock()?;
        let file = self
            .get_file(file_id)?
            .filter(|f| f.project_id == project_id)
            .ok_or_else(|| StoreError::not_found("file", file_id))?;
        let mut project = self
            .get_project(project_id)?
            .ok_or_else(|| StoreError::not_found("project", project_id))?;

        project.files_count = project.files_count.saturating_sub(1);
        project.lines_of_code = project.lines_of_code.saturating_sub(file.lines);

        let mut batch = WriteBatch::default();
        batch.delete_cf(self.cf(CF_FILES)?, file_id.as_bytes());
        batch.delete_cf(self.cf(CF_ROOMS)?, file.room_id.as_bytes());
        batch.delete_cf(
            self.cf(CF_MEMBERS)?,
            compound_key(&[project_id.as_bytes(), file_id.as_bytes()]),
        );
        batch.put_cf(
            self.cf(CF_PROJECTS)?,
            project_id.as_bytes(),
            encode(&project)?,
        );
        self.stage_activity(
            &mut batch,
            project_id,
            Some(actor),
            ActivityKind::FileDeleted { filename: file.filename.clone() },
        )?;
        self.write(batch)?;

        Ok(file)
    }

    /// Record the current line count of the file bound to `room_id`.
    ///
    /// The owning project's `lines_of_code` moves by the difference. Returns
    /// `None` when the room is not bound to a file, and skips the write when
    /// the count is unchanged.
    pub fn update_file_lines(
        &self,
        room_id: Uuid,
        lines: u64,
    ) -> Result<Option<ProjectFile>, StoreError> {
        let _guard = self.lock()?;
        let Some(mut file) = self.find_file_by_room(room_id)? else {
            return Ok(None);
        };
        if file.lines == lines {
            return Ok(Some(file));
        }
        let mut project = self
            .get_project(file.project_id)?
            .ok_or_else(|| StoreError::not_found("project", file.project_id))?;

        project.lines_of_code = (project.lines_of_code + lines).saturating_sub(file.lines);
        file.lines = lines;

        let mut batch = WriteBatch::default();
        batch.put_cf(self.cf(CF_FILES)?, file.id.as_bytes(), encode(&file)?);
        batch.put_cf(
            self.cf(CF_PROJECTS)?,
            project.id.as_bytes(),
            encode(&project)?,
        );
        self.stage_activity(
            &mut batch,
            project.id,
            None,
            ActivityKind::FileEdited { filename: file.filename.clone(), lines },
        )?;
        self.write(batch)?;

        Ok(Some(file))
    }

    fn files_of(&self, project_id: Uuid) -> Result<Vec<ProjectFile>, StoreError> {
        let mut files = Vec::new();
        for (key, _) in self.scan_prefix(CF_MEMBERS, project_id.as_bytes())? {
            let file_id = uuid_at(&key, 16, CF_MEMBERS)?;
            if let Some(file) = self.get_file(file_id)? {
                files.push(file);
            }
        }
        Ok(files)
    }

    // ─── Activity ─────────────────────────────────────────────────────

    /// Append an entry to a project's log.
    pub fn append_activity(
        &self,
        project_id: Uuid,
        actor: Option<Uuid>,
        kind: ActivityKind,
    ) -> Result<ActivityEntry, StoreError> {
        let _guard = self.lock()?;
        let mut batch = WriteBatch::default();
        let entry = self.stage_activity(&mut batch, project_id, actor, kind)?;
        self.write(batch)?;
        Ok(entry)
    }

    /// Newest entries first, at most `limit`.
    pub fn list_activity(
        &self,
        project_id: Uuid,
        limit: usize,
    ) -> Result<Vec<ActivityEntry>, StoreError> {
        let rows = self.scan_prefix(CF_ACTIVITY, project_id.as_bytes())?;
        rows.iter()
            .rev()
            .take(limit)
            .map(|(_, value)| decode(value))
            .collect()
    }

    /// Queue an activity entry on `batch`. Caller holds the store lock.
    fn stage_activity(
        &self,
        batch: &mut WriteBatch,
        project_id: Uuid,
        actor: Option<Uuid>,
        kind: ActivityKind,
    ) -> Result<ActivityEntry, StoreError> {
        let upper = compound_key(&[project_id.as_bytes(), &u64::MAX.to_be_bytes()]);
        let sequence = match self.last_key_with_prefix(CF_ACTIVITY, project_id.as_bytes(), &upper)? {
            Some(key) => {
                let raw: [u8; 8] = key
                    .get(16..24)
                    .and_then(|s| s.try_into().ok())
                    .ok_or(StoreError::CorruptKey(CF_ACTIVITY))?;
                u64::from_be_bytes(raw) + 1
            }
            None => 0,
        };

        let entry = ActivityEntry {
            project_id,
            sequence,
            at: unix_now(),
            actor,
            kind,
        };
        batch.put_cf(
            self.cf(CF_ACTIVITY)?,
            compound_key(&[project_id.as_bytes(), &sequence.to_be_bytes()]),
            encode(&entry)?,
        );
        Ok(entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::StoreConfig;
    use codeverse_core::Language;

    fn open() -> (tempfile::TempDir, AppStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = AppStore::open(StoreConfig::for_testing(dir.path().join("app"))).unwrap();
        (dir, store)
    }

    #[test]
    fn test_create_and_list_projects() {
        let (_dir, store) = open();
        let owner = Uuid::new_v4();
        let mut first = Project::new(owner, "first", Language::Python);
        first.created_at = 10;
        let mut second = Project::new(owner, "second", Language::Java);
        second.created_at = 20;
        store.create_project(&second, owner).unwrap();
        store.create_project(&first, owner).unwrap();
        store
            .create_project(&Project::new(Uuid::new_v4(), "other", Language::Html), owner)
            .unwrap();

        let names: Vec<_> = store
            .list_projects(owner)
            .unwrap()
            .into_iter()
            .map(|p| p.name)
            .collect();
        assert_eq!(names, vec!["first", "second"]);
    }

    #[test]
    fn test_file_counters_follow_create_and_delete() {
        let (_dir, store) = open();
        let owner = Uuid::new_v4();
        let project = Project::new(owner, "p", Language::Python);
        store.create_project(&project, owner).unwrap();

        let a = ProjectFile::new(project.id, "a.py", Language::Python);
        let b = ProjectFile::new(project.id, "b.py", Language::Python);
        store.create_file(&a, owner).unwrap();
        let updated = store.create_file(&b, owner).unwrap();
        assert_eq!(updated.files_count, 2);

        store.update_file_lines(a.room_id, 12).unwrap();
        store.update_file_lines(b.room_id, 3).unwrap();
        assert_eq!(store.get_project(project.id).unwrap().unwrap().lines_of_code, 15);

        store.update_file_lines(a.room_id, 10).unwrap();
        assert_eq!(store.get_project(project.id).unwrap().unwrap().lines_of_code, 13);

        store.delete_file(project.id, a.id, owner).unwrap();
        let after = store.get_project(project.id).unwrap().unwrap();
        assert_eq!(after.files_count, 1);
        assert_eq!(after.lines_of_code, 3);
        assert!(store.find_file_by_room(a.room_id).unwrap().is_none());
    }

    #[test]
    fn test_duplicate_filename_conflicts() {
        let (_dir, store) = open();
        let owner = Uuid::new_v4();
        let project = Project::new(owner, "p", Language::Cpp);
        store.create_project(&project, owner).unwrap();
        store
            .create_file(&ProjectFile::new(project.id, "main.cpp", Language::Cpp), owner)
            .unwrap();
        let err = store
            .create_file(&ProjectFile::new(project.id, "main.cpp", Language::Cpp), owner)
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[test]
    fn test_delete_file_checks_project() {
        let (_dir, store) = open();
        let owner = Uuid::new_v4();
        let project = Project::new(owner, "p", Language::Python);
        store.create_project(&project, owner).unwrap();
        let file = ProjectFile::new(project.id, "a.py", Language::Python);
        store.create_file(&file, owner).unwrap();

        let err = store.delete_file(Uuid::new_v4(), file.id, owner).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_update_lines_unknown_room() {
        let (_dir, store) = open();
        assert!(store.update_file_lines(Uuid::new_v4(), 4).unwrap().is_none());
    }

    #[test]
    fn test_activity_newest_first() {
        let (_dir, store) = open();
        let owner = Uuid::new_v4();
        let project = Project::new(owner, "p", Language::Python);
        store.create_project(&project, owner).unwrap();
        let file = ProjectFile::new(project.id, "a.py", Language::Python);
        store.create_file(&file, owner).unwrap();
        store.update_file_lines(file.room_id, 7).unwrap();

        let log = store.list_activity(project.id, 10).unwrap();
        let seqs: Vec<_> = log.iter().map(|e| e.sequence).collect();
        assert_eq!(seqs, vec![2, 1, 0]);
        assert_eq!(
            log[0].kind,
            ActivityKind::FileEdited { filename: "a.py".into(), lines: 7 }
        );
        assert_eq!(log[0].actor, None);
        assert_eq!(store.list_activity(project.id, 1).unwrap().len(), 1);
    }

    #[test]
    fn test_append_activity_after_existing() {
        let (_dir, store) = open();
        let owner = Uuid::new_v4();
        let project = Project::new(owner, "p", Language::Python);
        store.create_project(&project, owner).unwrap();
        let entry = store
            .append_activity(project.id, Some(owner), ActivityKind::FileCreated { filename: "x".into() })
            .unwrap();
        assert_eq!(entry.sequence, 1);
    }
}

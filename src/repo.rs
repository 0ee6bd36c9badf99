use std::fs::File;
use std::path::{Path, PathBuf};

use nix::fcntl::{Flock, FlockArg};

use crate::config::RepoConfig;
use crate::error::{Error, IoContext, Result};
use crate::index::Index;

/// name of the repository metadata directory
pub const DFM_DIR: &str = ".DFM";

/// name of the default branch created by init
pub const DEFAULT_BRANCH: &str = "main";

/// a forester repository
///
/// `root` is the working directory; everything the engine owns lives under
/// `<root>/.DFM/`.
pub struct Repo {
    root: PathBuf,
    config: RepoConfig,
}

impl Repo {
    /// initialize a new repository at the given working directory
    ///
    /// `force` re-initializes over an existing repository, discarding all
    /// stored objects and metadata.
    pub fn init(root: &Path, force: bool) -> Result<Self> {
        let dfm = root.join(DFM_DIR);
        if dfm.exists() {
            if !force {
                return Err(Error::AlreadyExists(format!(
                    "repository at {}",
                    root.display()
                )));
            }
            std::fs::remove_dir_all(&dfm).with_path(&dfm)?;
        }

        for kind_dir in ["blobs", "trees", "commits", "meshes", "textures"] {
            std::fs::create_dir_all(dfm.join("objects").join(kind_dir)).with_path(&dfm)?;
        }
        std::fs::create_dir_all(dfm.join("stash")).with_path(&dfm)?;
        std::fs::create_dir_all(dfm.join("refs/branches")).with_path(&dfm)?;
        std::fs::create_dir_all(dfm.join("refs/tags")).with_path(&dfm)?;
        std::fs::create_dir_all(dfm.join("hooks")).with_path(&dfm)?;
        std::fs::create_dir_all(dfm.join("tmp")).with_path(&dfm)?;

        let config = RepoConfig::default();
        config.save(&dfm.join("metadata.json"))?;

        let repo = Self {
            root: root.to_path_buf(),
            config,
        };

        // seed the index with the unborn default branch and HEAD
        let mut index = repo.index()?;
        index.create_branch(DEFAULT_BRANCH, None)?;
        index.set_meta("head", DEFAULT_BRANCH)?;
        crate::refs::write_head(&repo, &crate::refs::Head::Branch(DEFAULT_BRANCH.to_string()))?;

        Ok(repo)
    }

    /// open an existing repository whose working directory is `root`
    pub fn open(root: &Path) -> Result<Self> {
        let dfm = root.join(DFM_DIR);
        if !dfm.is_dir() {
            return Err(Error::NotARepo(root.to_path_buf()));
        }

        let config = RepoConfig::load(&dfm.join("metadata.json"))?;

        Ok(Self {
            root: root.to_path_buf(),
            config,
        })
    }

    /// open the repository containing `start`, walking up parent directories
    pub fn discover(start: &Path) -> Result<Self> {
        let mut current = Some(start);
        while let Some(dir) = current {
            if dir.join(DFM_DIR).is_dir() {
                return Self::open(dir);
            }
            current = dir.parent();
        }
        Err(Error::NotARepo(start.to_path_buf()))
    }

    /// working directory root
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// repository configuration
    pub fn config(&self) -> &RepoConfig {
        &self.config
    }

    /// mutable access to configuration
    pub fn config_mut(&mut self) -> &mut RepoConfig {
        &mut self.config
    }

    /// save configuration changes
    pub fn save_config(&self) -> Result<()> {
        self.config.save(&self.metadata_path())
    }

    /// path to the .DFM directory
    pub fn dfm_path(&self) -> PathBuf {
        self.root.join(DFM_DIR)
    }

    /// path to metadata.json
    pub fn metadata_path(&self) -> PathBuf {
        self.dfm_path().join("metadata.json")
    }

    /// path to the objects directory
    pub fn objects_path(&self) -> PathBuf {
        self.dfm_path().join("objects")
    }

    /// path to the branch refs directory
    pub fn branch_refs_path(&self) -> PathBuf {
        self.dfm_path().join("refs/branches")
    }

    /// path to the tag refs directory
    pub fn tag_refs_path(&self) -> PathBuf {
        self.dfm_path().join("refs/tags")
    }

    /// path to the hooks directory
    pub fn hooks_path(&self) -> PathBuf {
        self.dfm_path().join("hooks")
    }

    /// path to the stash object directory
    pub fn stash_path(&self) -> PathBuf {
        self.dfm_path().join("stash")
    }

    /// path to the tmp directory (for atomic writes)
    pub fn tmp_path(&self) -> PathBuf {
        self.dfm_path().join("tmp")
    }

    /// path to the HEAD file
    pub fn head_path(&self) -> PathBuf {
        self.dfm_path().join("HEAD")
    }

    /// path to the metadata index database
    pub fn db_path(&self) -> PathBuf {
        self.dfm_path().join("forester.db")
    }

    /// path to the ignore file
    pub fn ignore_path(&self) -> PathBuf {
        self.dfm_path().join(".dfmignore")
    }

    /// path to the repo lock file
    pub fn lock_path(&self) -> PathBuf {
        self.dfm_path().join(".lock")
    }

    /// open a fresh metadata index connection
    ///
    /// connections are never cached across operations; every operation
    /// observes the persisted state.
    pub fn index(&self) -> Result<Index> {
        Index::open(&self.db_path())
    }

    /// acquire the exclusive repo lock, blocking other writers
    /// returns a guard that releases the lock on drop
    pub fn lock(&self) -> Result<RepoLock> {
        let lock_path = self.lock_path();
        let file = File::create(&lock_path).with_path(&lock_path)?;

        let flock =
            Flock::lock(file, FlockArg::LockExclusive).map_err(|_| Error::LockContention)?;

        Ok(RepoLock { flock })
    }

    /// try to acquire the exclusive repo lock, returning None if already held
    pub fn try_lock(&self) -> Result<Option<RepoLock>> {
        let lock_path = self.lock_path();
        let file = File::create(&lock_path).with_path(&lock_path)?;

        match Flock::lock(file, FlockArg::LockExclusiveNonblock) {
            Ok(flock) => Ok(Some(RepoLock { flock })),
            Err((_, nix::errno::Errno::EWOULDBLOCK)) => Ok(None),
            Err(_) => Err(Error::LockContention),
        }
    }
}

/// guard that holds the repository lock until dropped
pub struct RepoLock {
    #[allow(dead_code)]
    flock: Flock<File>,
}
// lock is released automatically when Flock is dropped

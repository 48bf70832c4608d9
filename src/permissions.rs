//! The closed set of permission atoms a user can be granted on a path.

use bitflags::bitflags;

bitflags! {
    /// A set of permission atoms granted at some path in a user's permission map.
    ///
    /// `RENAME` is a convenience alias equal to `RENAME_FILES | RENAME_DIRS`: setting
    /// it on a path grants rename of both files and directories rooted there, but a
    /// request is always checked against the type-specific bit for the subject (see
    /// [`Permissions::grants_rename`]).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
    pub struct Permissions: u32 {
        /// List directory contents.
        const LIST_ITEMS      = 0b0000_0000_0001;
        /// Download (read) files.
        const DOWNLOAD        = 0b0000_0000_0010;
        /// Upload (create) new files.
        const UPLOAD           = 0b0000_0000_0100;
        /// Overwrite existing files.
        const OVERWRITE        = 0b0000_0000_1000;
        /// Delete files.
        const DELETE_FILES     = 0b0000_0001_0000;
        /// Delete directories.
        const DELETE_DIRS      = 0b0000_0010_0000;
        /// Rename files.
        const RENAME_FILES     = 0b0000_0100_0000;
        /// Rename directories.
        const RENAME_DIRS      = 0b0000_1000_0000;
        /// Create directories.
        const CREATE_DIRS      = 0b0001_0000_0000;
        /// Create symbolic links.
        const CREATE_SYMLINKS  = 0b0010_0000_0000;
        /// Change file mode bits.
        const CHMOD            = 0b0100_0000_0000;
        /// Change file ownership.
        const CHOWN            = 0b1000_0000_0000;
        /// Change file access/modification times.
        const CHTIMES          = 0b1_0000_0000_0000;

        /// Convenience alias granting rename of both files and directories.
        const RENAME = Self::RENAME_FILES.bits() | Self::RENAME_DIRS.bits();
        /// Grants every atom. Requesting `ANY` itself always succeeds if held.
        const ANY = u32::MAX;
    }
}

impl Permissions {
    /// Whether this permission set grants `atom`, accounting for `ANY`.
    pub fn grants(self, atom: Permissions) -> bool {
        self.contains(Permissions::ANY) || self.contains(atom)
    }

    /// Whether this permission set grants renaming a subject of the given type.
    /// `rename-dirs` only grants when `is_dir`; `rename-files` only when not.
    pub fn grants_rename(self, is_dir: bool) -> bool {
        let specific = if is_dir { Permissions::RENAME_DIRS } else { Permissions::RENAME_FILES };
        self.grants(specific)
    }

    /// Whether this permission set grants deletion of a subject of the given type.
    pub fn grants_delete(self, is_dir: bool) -> bool {
        let specific = if is_dir { Permissions::DELETE_DIRS } else { Permissions::DELETE_FILES };
        self.grants(specific)
    }
}

impl Default for Permissions {
    /// The default for a path with no explicit entry is "nothing" — callers always
    /// fall back to the nearest ancestor key rather than relying on this default.
    fn default() -> Self {
        Permissions::empty()
    }
}

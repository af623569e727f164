#[derive(Copy, Clone, PartialEq, Eq)]
pub enum FileType {
    NO_TYPE,
    T_DIR, // Directory
    T_FILE, // File
    T_DEVICE, // Device
}

pub struct Stat {
    pub dev: i32, // File system's disk device
    pub ino: u32, // Inode number
    pub file_type: FileType, // Type of file
    pub nlink: i16, // Number of links to file
    pub size: usize, // Size of file in bytes
}

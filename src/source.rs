use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// ファイル識別子
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Default)]
pub struct FileId(u32);

impl FileId {
    /// 内部IDを取得（デバッグ用）
    pub fn as_u32(self) -> u32 {
        self.0
    }
}

/// ソース位置
///
/// line/column は 1 始まり。0 は「解決できなかった」ことを表す。
/// offset はファイル先頭からのバイトオフセットで、内容抽出に使用する。
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SourceLocation {
    pub file_id: FileId,
    pub line: u32,
    pub column: u32,
    pub offset: u32,
}

impl SourceLocation {
    /// 新しいソース位置を作成
    pub fn new(file_id: FileId, line: u32, column: u32, offset: u32) -> Self {
        Self {
            file_id,
            line,
            column,
            offset,
        }
    }

    /// 行・列が解決済みかどうか
    pub fn is_resolved(&self) -> bool {
        self.line != 0
    }

    /// ファイルレベル位置の正準順序
    ///
    /// 同一ファイル内で self が other より厳密に前にあるとき true。
    /// バイトオフセットではなく行・列で比較する。
    pub fn is_before(&self, other: &SourceLocation) -> bool {
        debug_assert_eq!(self.file_id, other.file_id);
        (self.line, self.column) < (other.line, other.column)
    }
}

/// ソース範囲 (begin, end)
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SourceRange {
    pub begin: SourceLocation,
    pub end: SourceLocation,
}

impl SourceRange {
    /// 新しい範囲を作成
    pub fn new(begin: SourceLocation, end: SourceLocation) -> Self {
        Self { begin, end }
    }
}

/// ファイルレジストリ
///
/// パスと FileId の対応に加えて、登録されたファイルのソースバイト列を
/// 保持する（範囲からの内容抽出に使用）。
#[derive(Debug, Default, Clone)]
pub struct FileRegistry {
    paths: Vec<PathBuf>,
    sources: Vec<Vec<u8>>,
    path_to_id: HashMap<PathBuf, FileId>,
}

impl FileRegistry {
    /// 新しいレジストリを作成
    pub fn new() -> Self {
        Self {
            paths: Vec::new(),
            sources: Vec::new(),
            path_to_id: HashMap::new(),
        }
    }

    /// パスとソースを登録してIDを返す
    ///
    /// 同じパスを再登録した場合は既存のIDを返す（ソースは差し替えない）。
    pub fn register(&mut self, path: PathBuf, source: Vec<u8>) -> FileId {
        if let Some(&id) = self.path_to_id.get(&path) {
            return id;
        }
        let id = FileId(self.paths.len() as u32);
        self.path_to_id.insert(path.clone(), id);
        self.paths.push(path);
        self.sources.push(source);
        id
    }

    /// IDからパスを取得
    pub fn get_path(&self, id: FileId) -> &Path {
        &self.paths[id.0 as usize]
    }

    /// IDからソースバイト列を取得
    pub fn source(&self, id: FileId) -> &[u8] {
        &self.sources[id.0 as usize]
    }

    /// 範囲の両端オフセットに挟まれた生テキストを抽出
    ///
    /// オフセットが不正な場合や end が begin より前の場合は空スライスを
    /// 返す（エラーにしない）。
    pub fn extract(&self, range: &SourceRange) -> &[u8] {
        if range.begin.file_id != range.end.file_id {
            return b"";
        }
        let src = self.source(range.begin.file_id);
        let begin = range.begin.offset as usize;
        let end = range.end.offset as usize;
        if begin > end || end > src.len() {
            return b"";
        }
        &src[begin..end]
    }

    /// 登録されているファイル数を返す
    pub fn len(&self) -> usize {
        self.paths.len()
    }

    /// レジストリが空かどうか
    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_and_extract() {
        let mut registry = FileRegistry::new();
        let id = registry.register(PathBuf::from("/tmp/a.c"), b"int x = 1;".to_vec());

        assert_eq!(registry.get_path(id), Path::new("/tmp/a.c"));

        let range = SourceRange::new(
            SourceLocation::new(id, 1, 5, 4),
            SourceLocation::new(id, 1, 10, 9),
        );
        assert_eq!(registry.extract(&range), b"x = 1");
    }

    #[test]
    fn test_extract_reversed_range_is_empty() {
        let mut registry = FileRegistry::new();
        let id = registry.register(PathBuf::from("/tmp/b.c"), b"abc".to_vec());

        let range = SourceRange::new(
            SourceLocation::new(id, 1, 3, 2),
            SourceLocation::new(id, 1, 1, 0),
        );
        assert_eq!(registry.extract(&range), b"");

        // 範囲外オフセットも空
        let range = SourceRange::new(
            SourceLocation::new(id, 1, 1, 0),
            SourceLocation::new(id, 9, 9, 99),
        );
        assert_eq!(registry.extract(&range), b"");
    }

    #[test]
    fn test_same_path_same_id() {
        let mut registry = FileRegistry::new();
        let id1 = registry.register(PathBuf::from("/tmp/c.c"), b"1".to_vec());
        let id2 = registry.register(PathBuf::from("/tmp/c.c"), b"2".to_vec());

        assert_eq!(id1, id2);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_is_before() {
        let id = FileId::default();
        let a = SourceLocation::new(id, 3, 1, 20);
        let b = SourceLocation::new(id, 3, 5, 24);
        let c = SourceLocation::new(id, 4, 1, 30);

        assert!(a.is_before(&b));
        assert!(b.is_before(&c));
        assert!(!b.is_before(&a));
        assert!(!a.is_before(&a));
    }
}

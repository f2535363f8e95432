//! 컬럼 이름이 붙은 조회 결과.

/// 조회 결과 표.
///
/// 컬럼 이름은 준비된 문장의 메타데이터에서 가져오며, 행은 타입이 지정된 레코드입니다.
/// 조회 대상 시리즈가 없어 쿼리를 실행하지 않은 경우 컬럼도 비어 있습니다.
#[derive(Debug, Clone, PartialEq)]
pub struct Table<T> {
    columns: Vec<String>,
    rows: Vec<T>,
}

impl<T> Table<T> {
    pub fn new(columns: Vec<String>, rows: Vec<T>) -> Self {
        Self { columns, rows }
    }

    /// 빈 표.
    pub fn empty() -> Self {
        Self {
            columns: Vec::new(),
            rows: Vec::new(),
        }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[T] {
        &self.rows
    }

    pub fn into_rows(self) -> Vec<T> {
        self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// 컬럼 이름의 위치를 찾습니다.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.rows.iter()
    }
}

impl<T> Default for Table<T> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<T> IntoIterator for Table<T> {
    type Item = T;
    type IntoIter = std::vec::IntoIter<T>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.into_iter()
    }
}

impl<'a, T> IntoIterator for &'a Table<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.iter()
    }
}

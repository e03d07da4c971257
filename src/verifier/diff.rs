/// Lines of unchanged context around each change.
const CONTEXT: usize = 3;

/// Above this many table cells, a differing block is reported as
/// entirely removed and re-added instead of aligned line by line.
const MAX_TABLE_CELLS: usize = 1 << 24;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Edit {
    Keep,
    Remove,
    Add,
}

/// Unified diff of two texts, with `---`/`+++` headers and `@@` hunks.
/// Empty when the texts have the same lines.
pub fn unified_diff(from: &str, to: &str, from_name: &str, to_name: &str) -> Vec<String> {
    let a: Vec<&str> = from.lines().collect();
    let b: Vec<&str> = to.lines().collect();
    let edits = edit_script(&a, &b);

    // (a, b) line positions before each edit, plus the end:
    let mut pos = Vec::with_capacity(edits.len() + 1);
    let (mut i, mut j) = (0, 0);
    for edit in &edits {
        pos.push((i, j));
        match edit {
            Edit::Keep => {
                i += 1;
                j += 1;
            }
            Edit::Remove => i += 1,
            Edit::Add => j += 1,
        }
    }
    pos.push((i, j));

    let changes: Vec<usize> = edits
        .iter()
        .enumerate()
        .filter(|(_, e)| **e != Edit::Keep)
        .map(|(k, _)| k)
        .collect();
    if changes.is_empty() {
        return Vec::new();
    }

    let mut out = vec![format!("--- {}", from_name), format!("+++ {}", to_name)];
    let mut k = 0;
    while k < changes.len() {
        let first = changes[k];
        let mut last = first;
        k += 1;
        while k < changes.len() && changes[k] - last <= 2 * CONTEXT + 1 {
            last = changes[k];
            k += 1;
        }
        let start = first.saturating_sub(CONTEXT);
        let end = (last + CONTEXT + 1).min(edits.len());
        let ((a0, b0), (a1, b1)) = (pos[start], pos[end]);
        out.push(format!("@@ -{} +{} @@", range(a0, a1), range(b0, b1)));
        for idx in start..end {
            let (pi, pj) = pos[idx];
            out.push(match edits[idx] {
                Edit::Keep => format!(" {}", a[pi]),
                Edit::Remove => format!("-{}", a[pi]),
                Edit::Add => format!("+{}", b[pj]),
            });
        }
    }
    out
}

/// `start,len` with 1-based start; a single line is just `start`.
fn range(start: usize, stop: usize) -> String {
    match stop - start {
        1 => format!("{}", start + 1),
        0 => format!("{},0", start),
        len => format!("{},{}", start + 1, len),
    }
}

fn edit_script(a: &[&str], b: &[&str]) -> Vec<Edit> {
    let prefix = a.iter().zip(b).take_while(|(x, y)| x == y).count();
    let suffix = a[prefix..]
        .iter()
        .rev()
        .zip(b[prefix..].iter().rev())
        .take_while(|(x, y)| x == y)
        .count();

    let mut edits = vec![Edit::Keep; prefix];
    edits.extend(align(
        &a[prefix..a.len() - suffix],
        &b[prefix..b.len() - suffix],
    ));
    edits.extend(std::iter::repeat(Edit::Keep).take(suffix));
    edits
}

/// Longest-common-subsequence alignment.
fn align(a: &[&str], b: &[&str]) -> Vec<Edit> {
    let (n, m) = (a.len(), b.len());
    let mut edits = Vec::with_capacity(n + m);
    if n == 0 || m == 0 || (n + 1) * (m + 1) > MAX_TABLE_CELLS {
        edits.extend(std::iter::repeat(Edit::Remove).take(n));
        edits.extend(std::iter::repeat(Edit::Add).take(m));
        return edits;
    }

    // lcs[i * w + j] is the LCS length of a[i..] and b[j..]
    let w = m + 1;
    let mut lcs = vec![0u32; (n + 1) * w];
    for i in (0..n).rev() {
        for j in (0..m).rev() {
            lcs[i * w + j] = if a[i] == b[j] {
                lcs[(i + 1) * w + j + 1] + 1
            } else {
                lcs[(i + 1) * w + j].max(lcs[i * w + j + 1])
            };
        }
    }

    let (mut i, mut j) = (0, 0);
    while i < n && j < m {
        if a[i] == b[j] {
            edits.push(Edit::Keep);
            i += 1;
            j += 1;
        } else if lcs[(i + 1) * w + j] >= lcs[i * w + j + 1] {
            edits.push(Edit::Remove);
            i += 1;
        } else {
            edits.push(Edit::Add);
            j += 1;
        }
    }
    edits.extend(std::iter::repeat(Edit::Remove).take(n - i));
    edits.extend(std::iter::repeat(Edit::Add).take(m - j));
    edits
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identical() {
        assert!(unified_diff("a\nb\n", "a\nb\n", "x", "y").is_empty());
    }

    #[test]
    fn test_one_line_changed() {
        let diff = unified_diff("a\nb\nc\n", "a\nB\nc\n", "exp", "out");
        assert_eq!(
            diff,
            ["--- exp", "+++ out", "@@ -1,3 +1,3 @@", " a", "-b", "+B", " c"]
        );
    }

    #[test]
    fn test_context_is_limited() {
        let from: String = (1..=20).map(|i| format!("{}\n", i)).collect();
        let to = from.replace("10\n", "ten\n");
        let diff = unified_diff(&from, &to, "a", "b");
        assert_eq!(diff[2], "@@ -7,7 +7,7 @@");
        assert_eq!(diff[3], " 7");
        assert_eq!(diff.last().map(String::as_str), Some(" 13"));
    }

    #[test]
    fn test_distant_changes_make_two_hunks() {
        let from: String = (1..=30).map(|i| format!("{}\n", i)).collect();
        let to: String = (1..=30)
            .map(|i| match i {
                3 => "x\n".to_owned(),
                25 => "y\n".to_owned(),
                _ => format!("{}\n", i),
            })
            .collect();
        let hunks = unified_diff(&from, &to, "a", "b")
            .into_iter()
            .filter(|l| l.starts_with("@@"))
            .count();
        assert_eq!(hunks, 2);
    }

    #[test]
    fn test_insertion_into_empty() {
        let diff = unified_diff("", "new\n", "a", "b");
        assert_eq!(diff, ["--- a", "+++ b", "@@ -0,0 +1 @@", "+new"]);
    }
}

//! Iterator helpers.

use std::iter::Zip;

/// Like [`Iterator::zip`], but panics when the two iterators have different lengths.
///
/// Used wherever two sequences describe the same set of things (tensor dimensions and strides,
/// samples and their feature rows) and a length mismatch would be a bug.
#[track_caller]
pub fn zip_exact<A, B>(a: A, b: B) -> Zip<A::IntoIter, B::IntoIter>
where
    A: IntoIterator,
    B: IntoIterator,
    A::IntoIter: ExactSizeIterator,
    B::IntoIter: ExactSizeIterator,
{
    let a = a.into_iter();
    let b = b.into_iter();
    assert_eq!(
        a.len(),
        b.len(),
        "`zip_exact` called on iterators with different lengths"
    );

    a.zip(b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equal_lengths() {
        let pairs: Vec<_> = zip_exact([1, 2], ['a', 'b']).collect();
        assert_eq!(pairs, [(1, 'a'), (2, 'b')]);
    }

    #[test]
    #[should_panic = "different lengths"]
    fn unequal_lengths() {
        zip_exact([1, 2, 3], [1, 2]).for_each(drop);
    }
}

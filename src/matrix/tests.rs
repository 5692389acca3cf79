use super::*;

fn fixture() -> CsMat<f64> {
    from_dense(3, 3, &[1.0, 0.0, 2.0, 0.0, 3.0, 1.0, 2.0, 0.0, 0.0])
}

#[test]
fn test_row_statistics() {
    let m = fixture();
    assert_eq!(row_nnz(&m), vec![2, 2, 1]);
    assert_eq!(row_sums(&m), vec![3.0, 4.0, 2.0]);
    assert_eq!(masked_row_sums(&m, &[false, true, true]), vec![2.0, 4.0, 0.0]);
}

#[test]
fn test_statistics_ignore_storage_order() {
    let csc = with_storage(&fixture(), Compression::Csc);
    assert!(csc.is_csc());
    assert_eq!(row_sums(&csc), vec![3.0, 4.0, 2.0]);
    assert_eq!(row_nnz(&csc), vec![2, 2, 1]);
}

#[test]
fn test_integrality() {
    assert_eq!(fractional_sum(&fixture()), 0.0);
    let m = from_dense(1, 2, &[1.5, 2.0]);
    assert!(fractional_sum(&m) > 0.0);
}

#[test]
fn test_normalize_rows_sum_to_target() {
    let m = fixture();
    let normalized = normalize(&m, DEFAULT_TARGET_SUM);
    assert!(normalized.is_csr());

    let restored: Vec<f64> = {
        let mut sums = vec![0.0; normalized.rows()];
        for (&v, (r, _)) in normalized.iter() {
            sums[r] += v.exp_m1();
        }
        sums
    };
    for sum in restored {
        assert!((sum - DEFAULT_TARGET_SUM).abs() < 1e-6);
    }
}

#[test]
fn test_normalize_zero_row_stays_empty() {
    let m = from_dense(2, 2, &[0.0, 0.0, 4.0, 0.0]);
    let normalized = normalize(&m, DEFAULT_TARGET_SUM);
    assert_eq!(row_nnz(&normalized), vec![0, 1]);
    assert!(normalized.data().iter().all(|v| v.is_finite()));
    assert!((normalized.data()[0] - DEFAULT_TARGET_SUM.ln_1p()).abs() < 1e-12);
}

#[test]
fn test_select_columns_renumbers() {
    let m = fixture();
    let selected = select_columns(&m, &[2, 0]);
    assert_eq!(selected.shape(), (3, 2));
    assert_eq!(row_sums(&selected), vec![3.0, 1.0, 2.0]);
    assert_eq!(selected.get(0, 0), Some(&2.0));
    assert_eq!(selected.get(2, 1), Some(&2.0));
}

#[test]
fn test_coordinates_follow_storage_order() {
    let m = fixture();
    let (rows, cols, values) = to_coordinates(&m);
    assert_eq!(rows, vec![0, 0, 1, 1, 2]);
    assert_eq!(cols, vec![0, 2, 1, 2, 0]);
    assert_eq!(values, vec![1.0, 2.0, 3.0, 1.0, 2.0]);

    let (_, cols, _) = to_coordinates(&with_storage(&m, Compression::Csc));
    assert_eq!(cols, vec![0, 0, 1, 2, 2]);
}

/*!
Per-element loops over particle arrays.

Every closure only writes the element it is handed and reads shared state, so the parallel and the
sequential variants produce identical results.
*/

pub use internal::*;

#[cfg(not(feature = "parallel"))]
mod internal {
    pub fn par_iter_mut1<T1: Send + Sync, F: Fn(usize, &mut T1) + Send + Sync>(arr1: &mut [T1], f: F) {
        arr1.iter_mut().enumerate().for_each(|(idx, v1)| {
            f(idx, v1);
        });
    }

    pub fn par_iter_mut2<T1: Send + Sync, T2: Send + Sync, F: Fn(usize, &mut T1, &mut T2) + Send + Sync>(
        arr1: &mut [T1],
        arr2: &mut [T2],
        f: F,
    ) {
        arr1.iter_mut()
            .zip(arr2.iter_mut())
            .enumerate()
            .for_each(|(idx, (v1, v2))| {
                f(idx, v1, v2);
            });
    }
}

#[cfg(feature = "parallel")]
mod internal {
    use rayon::prelude::*;

    pub fn par_iter_mut1<T1: Send + Sync, F: Fn(usize, &mut T1) + Send + Sync>(arr1: &mut [T1], f: F) {
        arr1.into_par_iter().enumerate().for_each(|(idx, v1)| {
            f(idx, v1);
        });
    }

    pub fn par_iter_mut2<T1: Send + Sync, T2: Send + Sync, F: Fn(usize, &mut T1, &mut T2) + Send + Sync>(
        arr1: &mut [T1],
        arr2: &mut [T2],
        f: F,
    ) {
        arr1.into_par_iter()
            .zip(arr2.into_par_iter())
            .enumerate()
            .for_each(|(idx, (v1, v2))| {
                f(idx, v1, v2);
            });
    }
}

#[test]
fn par_iter_mut2_visits_every_index_once() {
    let mut a = vec![0usize; 1000];
    let mut b = vec![0usize; 1000];
    par_iter_mut2(&mut a, &mut b, |i, x, y| {
        *x += i;
        *y += 2 * i;
    });
    for i in 0..1000 {
        assert_eq!(a[i], i);
        assert_eq!(b[i], 2 * i);
    }
}

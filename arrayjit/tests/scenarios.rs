//! End-to-end scenarios (§8): constructors, the counter-based RNG, 1-D
//! convolution, einsum path planning, and the three transform laws
//! (JVP linearity, vmap/loop agreement, jit extensional equality).

use arrayjit::prelude::*;

#[test]
fn zeros_and_ones_have_the_requested_shape_and_fill() {
    let z = Array::cpu_zeros(&[2, 3], DType::F32).unwrap();
    assert_eq!(z.shape(), &[2, 3]);
    assert_eq!(z.to_vec_f32().unwrap(), vec![0.0; 6]);

    let o = Array::cpu_ones(&[2, 3], DType::F32).unwrap();
    assert_eq!(o.to_vec_f32().unwrap(), vec![1.0; 6]);
}

#[test]
fn random_bits_and_split_are_reproducible_for_a_fixed_seed() {
    let k = key(0);
    // threefry2x32([0,0], 0, 0)'s first output word, matching the public
    // Threefry-2x32-20 known-answer vector for key=(0,0), ctr=(0,0).
    assert_eq!(bits(k, 1)[0], 1_797_259_609u32);

    let subkeys = split(k, 3);
    assert_eq!(subkeys.len(), 3);
    let again = split(k, 3);
    assert_eq!(subkeys, again, "split must be a deterministic function of the key");
}

#[test]
fn conv1d_same_matches_worked_example() {
    let backend = cpu_backend();
    let x = Array::from_vec_f32(&[5], &[1.0, 2.0, 3.0, 4.0, 5.0], &backend).unwrap();
    let out = conv1d_same(&x, &[2.0, 0.5, -1.0], &backend).unwrap();
    let got = out.to_vec_f32().unwrap();
    for (g, w) in got.iter().zip([-1.5, 0.0, 1.5, 3.0, 10.5].iter()) {
        assert!((g - w).abs() < 1e-5);
    }
}

#[test]
fn einsum_path_matches_worked_example() {
    let plan = einsum_path("ij,jk,kl->il", &[vec![10, 20], vec![20, 30], vec![30, 40]]);
    assert_eq!(plan.path, vec![(0, 1), (2, 3)]);
    assert_eq!(plan.flops, 2 * (10 * 30 * 20 + 10 * 40 * 30));
}

struct Sin;
impl DifferentiableFn for Sin {
    fn apply<T: Numeric>(&self, x: &GenDual<T>) -> Result<GenDual<T>, ArrayError> {
        x.sin()
    }
}

#[test]
fn sin_nested_third_derivative_matches_worked_example() {
    let x = Array::cpu_scalar_f32(3.0).unwrap();

    let first = first_derivative(&Sin, &x).unwrap().to_vec_f32().unwrap()[0];
    assert!((first - (-0.989992)).abs() < 1e-5);

    let third = third_derivative(&Sin, &x).unwrap().to_vec_f32().unwrap()[0];
    assert!((third - 0.989992).abs() < 1e-5);
}

#[test]
fn jvp_is_linear_in_the_tangent() {
    let x = Array::cpu_scalar_f32(2.0).unwrap();
    let v1 = Array::cpu_scalar_f32(1.0).unwrap();
    let v2 = Array::cpu_scalar_f32(3.0).unwrap();

    let f = |d: &[Dual]| Ok(vec![d[0].mul(&d[0])?]);

    let (_, t1) = jvp(f, &[x.clone()], &[v1.clone()]).unwrap();
    let (_, t2) = jvp(f, &[x.clone()], &[v2.clone()]).unwrap();
    let v_sum = v1.add(&v2).unwrap();
    let (_, t_sum) = jvp(f, &[x], &[v_sum]).unwrap();

    let lhs = t1[0].to_vec_f32().unwrap()[0] + t2[0].to_vec_f32().unwrap()[0];
    let rhs = t_sum[0].to_vec_f32().unwrap()[0];
    assert!((lhs - rhs).abs() < 1e-5);
}

#[test]
fn vmap_over_axis_zero_agrees_with_a_manual_loop() {
    let xs = Array::cpu_from_vec_f32(&[4, 3], &(0..12).map(|v| v as f32).collect::<Vec<_>>()).unwrap();
    let ys = Array::cpu_from_vec_f32(&[4, 3], &(0..12).map(|v| (v as f32) * 2.0).collect::<Vec<_>>()).unwrap();

    let batched = vmap(|args| Ok(vec![args[0].mul(&args[1])?]), &[Some(0), Some(0)]);
    let out = batched(&[xs.clone(), ys.clone()]).unwrap();
    let got = out[0].to_vec_f32().unwrap();

    let xs_rows = xs.to_vec_f32().unwrap();
    let ys_rows = ys.to_vec_f32().unwrap();
    let want: Vec<f32> = xs_rows.iter().zip(ys_rows.iter()).map(|(a, b)| a * b).collect();
    assert_eq!(got, want);
}

#[test]
fn jit_is_extensionally_equal_to_the_eager_computation() {
    let x = Array::cpu_from_vec_f32(&[3], &[1.0, 2.0, 3.0]).unwrap();
    let y = Array::cpu_from_vec_f32(&[3], &[4.0, 5.0, 6.0]).unwrap();

    let f_jit = jit(|args| {
        let s = args[0].add(&args[1])?;
        Ok(vec![s.mul(&s)?])
    });
    let out = f_jit(&[x.clone(), y.clone()]).unwrap();

    let s = x.add(&y).unwrap();
    let eager = s.mul(&s).unwrap();
    assert_eq!(out[0].to_vec_f32().unwrap(), eager.to_vec_f32().unwrap());
}

//! Integration tests for tensor operations: broadcasting, dtype promotion,
//! reductions, devices and error reporting.

use lazygrad::uop::GraphError;
use lazygrad::{DType, Device, Error, GraphContext, Tensor};
use ndarray::{arr1, arr2, ArrayD};

fn assert_close(actual: &ArrayD<f32>, expected: &ArrayD<f32>) {
    assert_eq!(actual.shape(), expected.shape(), "shapes do not match");
    for (a, e) in actual.iter().zip(expected.iter()) {
        assert!((a - e).abs() < 1e-5, "{} != {}", a, e);
    }
}

#[test]
fn test_broadcast_row_against_matrix() {
    let ctx = GraphContext::shared();
    let m = Tensor::from_array(&ctx, arr2(&[[1, 2, 3], [4, 5, 6]]).into_dyn());
    let row = Tensor::new(&ctx, &[10, 20, 30]);

    let sum = &m + &row;
    assert_eq!(sum.shape(), vec![2, 3]);
    assert_eq!(
        sum.to_array::<i32>().unwrap(),
        arr2(&[[11, 22, 33], [14, 25, 36]]).into_dyn()
    );
}

#[test]
fn test_broadcast_column() {
    let ctx = GraphContext::shared();
    let col = Tensor::from_array(&ctx, arr2(&[[1.0f32], [2.0]]).into_dyn());
    let row = Tensor::new(&ctx, &[1.0f32, 10.0, 100.0]);

    let product = &col * &row;
    assert_close(
        &product.to_array::<f32>().unwrap(),
        &arr2(&[[1.0, 10.0, 100.0], [2.0, 20.0, 200.0]]).into_dyn(),
    );
}

#[test]
fn test_int_float_promotion() {
    let ctx = GraphContext::shared();
    let i = Tensor::new(&ctx, &[1, 2, 3]);
    let f = Tensor::new(&ctx, &[0.5f32, 0.5, 0.5]);

    let mixed = &i + &f;
    assert_eq!(mixed.dtype(), DType::Float32);
    assert_eq!(mixed.to_vec::<f32>().unwrap(), vec![1.5, 2.5, 3.5]);

    let scaled = &i * 2.5f32;
    assert_eq!(scaled.dtype(), DType::Float32);
    assert_eq!(scaled.to_vec::<f32>().unwrap(), vec![2.5, 5.0, 7.5]);
}

#[test]
fn test_int_division_is_float() {
    let ctx = GraphContext::shared();
    let t = Tensor::new(&ctx, &[1, 2, 3, 4]);
    let half = &t / 2;
    assert_eq!(half.dtype(), DType::Float32);
    assert_eq!(half.to_vec::<f32>().unwrap(), vec![0.5, 1.0, 1.5, 2.0]);
}

#[test]
fn test_sub_and_neg() {
    let ctx = GraphContext::shared();
    let t = Tensor::new(&ctx, &[3, 1, -2]);
    assert_eq!((&t - 1).to_vec::<i32>().unwrap(), vec![2, 0, -3]);
    assert_eq!((-&t).to_vec::<i32>().unwrap(), vec![-3, -1, 2]);
}

#[test]
fn test_comparisons() {
    let ctx = GraphContext::shared();
    let t = Tensor::new(&ctx, &[1, 2, 3, 4]);

    let lt = t.lt(3).unwrap();
    assert_eq!(lt.dtype(), DType::Bool);
    assert_eq!(lt.to_vec::<bool>().unwrap(), vec![true, true, false, false]);
    assert_eq!(
        t.gt(2).unwrap().to_vec::<bool>().unwrap(),
        vec![false, false, true, true]
    );
    assert_eq!(
        t.eq_elem(2).unwrap().to_vec::<bool>().unwrap(),
        vec![false, true, false, false]
    );
}

#[test]
fn test_maximum() {
    let ctx = GraphContext::shared();
    let t = Tensor::new(&ctx, &[-1.0f32, 0.5, 2.0]);
    assert_eq!(t.maximum(0.0f32).unwrap().to_vec::<f32>().unwrap(), vec![0.0, 0.5, 2.0]);
}

#[test]
fn test_unary_casts_ints_to_float() {
    let ctx = GraphContext::shared();
    let t = Tensor::new(&ctx, &[1, 4, 9]);
    let root = t.sqrt();
    assert_eq!(root.dtype(), DType::Float32);
    assert_eq!(root.to_vec::<f32>().unwrap(), vec![1.0, 2.0, 3.0]);

    let back = Tensor::new(&ctx, &[0.0f32, 1.0]).exp().log();
    assert_close(&back.to_array::<f32>().unwrap(), &arr1(&[0.0, 1.0]).into_dyn());
}

#[test]
fn test_sum() {
    let ctx = GraphContext::shared();
    let m = Tensor::from_array(&ctx, arr2(&[[1, 2, 3], [4, 5, 6]]).into_dyn());

    assert_eq!(m.sum(None).unwrap().item::<i32>().unwrap(), 21);
    assert_eq!(m.sum(Some(&[0])).unwrap().to_vec::<i32>().unwrap(), vec![5, 7, 9]);
    assert_eq!(m.sum(Some(&[1])).unwrap().to_vec::<i32>().unwrap(), vec![6, 15]);
}

#[test]
fn test_sum_of_bools_counts() {
    let ctx = GraphContext::shared();
    let t = Tensor::new(&ctx, &[1, 5, 2, 7]);
    let count = t.gt(1).unwrap().sum(None).unwrap();
    assert_eq!(count.dtype(), DType::Int32);
    assert_eq!(count.item::<i32>().unwrap(), 3);
}

#[test]
fn test_reshape_and_cast() {
    let ctx = GraphContext::shared();
    let t = Tensor::new(&ctx, &[1, 2, 3, 4, 5, 6]);
    let m = t.reshape(&[2, 3]).unwrap().cast(DType::Float32);
    assert_eq!(
        m.to_array::<f32>().unwrap(),
        arr2(&[[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]]).into_dyn()
    );
}

#[test]
fn test_full_zeros_ones() {
    let ctx = GraphContext::shared();
    let sevens = Tensor::full(&ctx, &[2, 2], 7);
    assert_eq!(sevens.dtype(), DType::Int32);
    assert_eq!(sevens.to_vec::<i32>().unwrap(), vec![7; 4]);

    let total = (Tensor::zeros(&ctx, &[3]) + Tensor::ones(&ctx, &[3])).sum(None).unwrap();
    assert_eq!(total.item::<f32>().unwrap(), 3.0);
}

#[test]
fn test_rand_is_seeded_and_in_range() {
    let ctx = GraphContext::shared();
    let a = Tensor::rand(&ctx, &[16], Some(7)).to_vec::<f32>().unwrap();
    let b = Tensor::rand(&ctx, &[16], Some(7)).to_vec::<f32>().unwrap();
    assert_eq!(a, b);
    assert!(a.iter().all(|x| (0.0..1.0).contains(x)));
}

#[test]
fn test_to_same_device_is_noop() {
    let ctx = GraphContext::shared();
    let t = Tensor::new(&ctx, &[1, 2]);
    assert_eq!(t.to(Device::Cpu).uop(), t.uop());
}

#[test]
fn test_copy_to_host_is_realized_and_counted() {
    let ctx = GraphContext::shared();
    let t = &Tensor::new(&ctx, &[1, 2, 3]) * 10;
    t.realize().unwrap();
    let before = ctx.borrow().stats();

    let host = t.to(Device::Host);
    assert_eq!(host.device(), Device::Host);
    assert_eq!(host.uop_node().unwrap().src, vec![t.uop()]);
    assert_eq!(host.to_vec::<i32>().unwrap(), vec![10, 20, 30]);

    let after = ctx.borrow().stats();
    assert_eq!(after.copies, before.copies + 1);
    assert_eq!(after.kernels, before.kernels);
    let buffer = host.uop_node().unwrap().buffer().unwrap();
    assert_eq!(ctx.borrow().buffers().get(buffer).unwrap().device, Device::Host);
}

#[test]
fn test_host_tensor_cannot_mix_with_cpu() {
    let ctx = GraphContext::shared();
    let t = Tensor::new(&ctx, &[1, 2]);
    let host = t.to(Device::Host);
    assert!(matches!(
        t.try_add(&host),
        Err(Error::Graph(GraphError::DeviceMismatch(Device::Cpu, Device::Host)))
    ));
}

#[test]
fn test_shape_mismatch_error() {
    let ctx = GraphContext::shared();
    let a = Tensor::new(&ctx, &[1, 2, 3]);
    let b = Tensor::new(&ctx, &[1, 2]);
    assert!(matches!(
        a.try_mul(&b),
        Err(Error::Graph(GraphError::IncompatibleShapes(_, _)))
    ));
}

#[test]
fn test_invalid_reshape() {
    let ctx = GraphContext::shared();
    let t = Tensor::new(&ctx, &[1, 2, 3]);
    assert!(matches!(
        t.reshape(&[2, 2]),
        Err(Error::Graph(GraphError::InvalidReshape { .. }))
    ));
}

#[test]
fn test_dtype_mismatch_on_read() {
    let ctx = GraphContext::shared();
    let t = Tensor::new(&ctx, &[1, 2]);
    assert!(matches!(
        t.to_vec::<f32>(),
        Err(Error::DTypeMismatch { requested: DType::Float32, actual: DType::Int32 })
    ));
}

#[test]
fn test_item_needs_one_element() {
    let ctx = GraphContext::shared();
    let t = Tensor::new(&ctx, &[1, 2]);
    assert!(matches!(t.item::<i32>(), Err(Error::NotScalar(2))));
}

#[test]
fn test_realize_all_rejects_mixed_contexts() {
    let a = Tensor::new(&GraphContext::shared(), &[1]);
    let b = Tensor::new(&GraphContext::shared(), &[1]);
    assert!(matches!(
        Tensor::realize_all(&[&a, &b]),
        Err(Error::Graph(GraphError::ContextMismatch))
    ));
}

#[test]
#[should_panic(expected = "mul failed")]
fn test_mul_operator_panics_on_mismatch() {
    let ctx = GraphContext::shared();
    let a = Tensor::new(&ctx, &[1, 2, 3]);
    let b = Tensor::new(&ctx, &[1, 2]);
    let _ = a * b;
}

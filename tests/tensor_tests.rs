use momentum_op::error::{Error, ErrorKind};
use momentum_op::tensors::{AnyTensor, Tensor};
use momentum_op::{DataType, tensor};

#[test]
fn test_tensor_creation() {
    let t = Tensor::new(vec![2, 2], vec![1.0f32, 2.0, 3.0, 4.0]);
    assert_eq!(t.shape.dims(), &[2, 2]);
    assert_eq!(t.data, vec![1.0, 2.0, 3.0, 4.0]);
}

#[test]
fn test_tensor_shape_mismatch_panics() {
    let result = std::panic::catch_unwind(|| {
        Tensor::new(vec![2, 2], vec![1.0f64, 2.0, 3.0]);
    });
    assert!(result.is_err());
}

#[test]
fn test_try_new_reports_invalid_tensor() {
    let err = Tensor::try_new(vec![3], vec![1.0f32]).unwrap_err();
    assert!(matches!(err, Error::InvalidTensor(_)));
    assert_eq!(err.kind(), ErrorKind::Tensor);

    let ok = Tensor::try_new(vec![1, 1], vec![0.5f32]).unwrap();
    assert_eq!(ok.item(), Some(0.5));
}

#[test]
fn test_tensor_macro() {
    let t = tensor!([[1.0f32, 2.0], [3.0, 4.0]]);
    assert_eq!(t.shape.dims(), &[2, 2]);
    assert_eq!(t.data, vec![1.0, 2.0, 3.0, 4.0]);

    let s = tensor!(0.5f64);
    assert_eq!(s.shape.rank(), 0);
    assert_eq!(s.item(), Some(0.5));
}

#[test]
fn test_any_tensor_keeps_dtype_and_shape() {
    let any = AnyTensor::from(Tensor::<f64>::zeros(vec![3, 0]));
    assert_eq!(any.dtype(), DataType::F64);
    assert_eq!(any.shape().dims(), &[3, 0]);
    assert!(any.as_typed::<f32>().is_none());
    assert!(any.as_typed::<f64>().unwrap().is_empty());
}
